use color_eyre::{
    Result,
    eyre::{OptionExt, WrapErr},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    select,
    sync::{mpsc::UnboundedReceiver, watch},
};
use tracing::{debug, info};

use crate::{
    accounts::{Accounts, SignedIn},
    action::{Action, session_keys},
    autosave::AutoSaveStatus,
    dossier::TastingNoteEditor,
    remote::{AuthBackend, NotesBackend},
    storage::LocalStorage,
};

/// Interactive tasting session: reads commands from stdin and feeds them to the editor.
pub struct App<B, S> {
    editor: TastingNoteEditor<B, S>,
    accounts: Accounts<B, S>,
    status_rx: watch::Receiver<AutoSaveStatus>,
    notice_rx: UnboundedReceiver<String>,
    should_quit: bool,
}

impl<B, S> App<B, S>
where
    B: NotesBackend + AuthBackend,
    S: LocalStorage,
{
    pub fn new(mut editor: TastingNoteEditor<B, S>, accounts: Accounts<B, S>) -> Result<Self> {
        let notice_rx = editor.take_notices().ok_or_eyre("editor notices already taken")?;
        Ok(Self {
            status_rx: editor.status(),
            editor,
            accounts,
            notice_rx,
            should_quit: false,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("Tasting whisky {}. Type help for commands.", self.editor.whisky_id());
        println!("{}", self.editor.form());

        while !self.should_quit {
            select! {
                line = lines.next_line() => {
                    match line.wrap_err("reading input")? {
                        Some(line) if line.trim().is_empty() => {}
                        Some(line) => self.handle_line(&line).await,
                        None => self.should_quit = true,
                    }
                }
                Ok(()) = self.status_rx.changed() => {
                    let status = *self.status_rx.borrow_and_update();
                    println!("[{status}]");
                }
                Some(notice) = self.notice_rx.recv() => println!("! {notice}"),
            }
        }

        info!("Leaving tasting session for {}", self.editor.whisky_id());
        self.editor.close().await;
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) {
        let result = match line.parse::<Action>() {
            Ok(action) => {
                debug!("{action:?}");
                self.handle_action(action).await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            println!("! {err:#}");
        }
    }

    async fn handle_action(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Rate(rating) => self.editor.set_rating(rating),
            Action::ToggleFlavor(tag) => {
                let selected = self.editor.toggle_flavor(&tag)?;
                println!("{} {tag}", if selected { "+" } else { "-" });
            }
            Action::SetIntensity(axis, level) => self.editor.set_intensity(axis, level)?,
            Action::SetNote(text) => self.editor.set_note(&text),
            Action::Show => println!("{}", self.editor.form()),
            Action::Status => println!("[{}]", *self.status_rx.borrow()),
            Action::Flush => self.editor.flush(),
            Action::Delete => {
                self.editor.delete().await?;
                println!("Deleted. Starting over with an empty note.");
            }
            Action::Login { email, password } => {
                self.editor.settle().await?;
                let signed_in = self.accounts.sign_in(&email, &password).await?;
                print_signed_in(&signed_in);
                self.editor.reload().await?;
            }
            Action::Signup { email, password } => {
                self.editor.settle().await?;
                let signed_in = self.accounts.sign_up(&email, &password).await?;
                print_signed_in(&signed_in);
                self.editor.reload().await?;
            }
            Action::Logout => {
                self.editor.settle().await?;
                self.accounts.sign_out()?;
                self.editor.reload().await?;
                println!("Signed out. New edits are saved as a guest.");
            }
            Action::Help => {
                for key in session_keys() {
                    println!("  {:<28} {}", key.key, key.text);
                }
            }
            Action::Quit => self.should_quit = true,
        }
        Ok(())
    }
}

pub fn print_signed_in(signed_in: &SignedIn) {
    println!("Signed in as {}", signed_in.session.email);
    if let Some(notice) = signed_in.migration.notice() {
        println!("! {notice}");
    }
}
