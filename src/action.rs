use std::str::FromStr;

use color_eyre::eyre::{Report, Result, bail, eyre};
use educe::Educe;

use crate::remote::{IntensityAxis, Rating};

/// One line of input in a tasting session.
#[derive(Educe, Clone, PartialEq, Eq)]
#[educe(Debug)]
pub enum Action {
    Rate(Option<Rating>),
    ToggleFlavor(String),
    SetIntensity(IntensityAxis, u8),
    SetNote(String),
    Show,
    Status,
    Flush,
    Delete,
    Login {
        email: String,
        #[educe(Debug(ignore))]
        password: String,
    },
    Signup {
        email: String,
        #[educe(Debug(ignore))]
        password: String,
    },
    Logout,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevantKey {
    pub key: String,
    pub text: String,
}

impl RelevantKey {
    pub fn new(key: &'static str, text: &'static str) -> Self {
        Self {
            key: key.to_owned(),
            text: text.to_owned(),
        }
    }
}

pub fn session_keys() -> Vec<RelevantKey> {
    vec![
        RelevantKey::new("rate <1-5|none>", "Set or clear the star rating"),
        RelevantKey::new("flavor <tag>", "Toggle a flavor tag"),
        RelevantKey::new("intensity <axis> <0-4>", "fruit, floral, oak, smoke or spice"),
        RelevantKey::new("note <text>", "Replace the free-text note"),
        RelevantKey::new("show", "Show the current note"),
        RelevantKey::new("status", "Show the auto-save status"),
        RelevantKey::new("flush", "Save now instead of waiting"),
        RelevantKey::new("delete", "Delete this note"),
        RelevantKey::new("login <email> <password>", "Sign in, keeping guest notes"),
        RelevantKey::new("signup <email> <password>", "Create an account, keeping guest notes"),
        RelevantKey::new("logout", "Sign out"),
        RelevantKey::new("quit", "Leave the session"),
    ]
}

fn credentials(rest: &str) -> Result<(String, String)> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(email), Some(password), None) => Ok((email.to_string(), password.to_string())),
        _ => bail!("expected <email> <password>"),
    }
}

impl FromStr for Action {
    type Err = Report;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        Ok(match command.to_lowercase().as_str() {
            "rate" | "rating" => match rest {
                "none" | "-" | "" => Action::Rate(None),
                stars => Action::Rate(Some(Rating::new(stars.parse()?)?)),
            },
            "flavor" | "flavour" => Action::ToggleFlavor(rest.to_string()),
            "intensity" => {
                let mut parts = rest.split_whitespace();
                let (Some(axis), Some(level), None) = (parts.next(), parts.next(), parts.next())
                else {
                    bail!("expected intensity <axis> <0-4>");
                };
                let axis = axis
                    .parse()
                    .map_err(|_| eyre!("unknown axis {axis:?}, use fruit, floral, oak, smoke or spice"))?;
                Action::SetIntensity(axis, level.parse()?)
            }
            "note" => Action::SetNote(rest.to_string()),
            "show" => Action::Show,
            "status" => Action::Status,
            "flush" | "save" => Action::Flush,
            "delete" => Action::Delete,
            "login" => {
                let (email, password) = credentials(rest)?;
                Action::Login { email, password }
            }
            "signup" => {
                let (email, password) = credentials(rest)?;
                Action::Signup { email, password }
            }
            "logout" => Action::Logout,
            "help" | "?" => Action::Help,
            "quit" | "exit" | "q" => Action::Quit,
            other => bail!("unknown command {other:?}, try help"),
        })
    }
}
