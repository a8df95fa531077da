use std::sync::Arc;

use color_eyre::{Result, eyre::WrapErr};
use tracing::info;

use crate::{
    accounts::Accounts,
    app::{App, print_signed_in},
    cli::Command,
    config::Config,
    dossier::TastingNoteEditor,
    identity::Identity,
    matching,
    remote::{NotesBackend, RestBackend, Scope, WhiskyId},
    storage::{FileStorage, LocalStorage},
};

pub async fn run(command: Command, config: Config) -> Result<()> {
    let storage = Arc::new(FileStorage::open(config.config.data_dir.clone())?);
    let identity = Arc::new(Identity::load(storage)?);
    let backend = Arc::new(RestBackend::new(&config.backend));
    let accounts = Accounts::new(backend.clone(), identity.clone());

    match command {
        Command::Taste { whisky } => {
            info!("Opening tasting session for {whisky}");
            let editor = TastingNoteEditor::open(backend, identity, whisky, &config.autosave).await;
            App::new(editor, accounts)?.run().await
        }
        Command::Login { email, password } => {
            let signed_in = accounts.sign_in(&email, &password).await?;
            print_signed_in(&signed_in);
            Ok(())
        }
        Command::Signup { email, password } => {
            let signed_in = accounts.sign_up(&email, &password).await?;
            print_signed_in(&signed_in);
            Ok(())
        }
        Command::Logout => {
            accounts.sign_out()?;
            println!("Signed out");
            Ok(())
        }
        Command::Whoami => {
            match identity.read_scope() {
                Scope::User(session) => println!("{} ({})", session.email, session.user_id),
                Scope::Guest(id) => println!("guest {id}"),
                Scope::Anonymous => println!("nobody yet, the first note starts a guest session"),
            }
            Ok(())
        }
        Command::Match { whisky, limit } => {
            let limit = limit.unwrap_or(config.matching.limit);
            print_matches(backend.as_ref(), identity.as_ref(), whisky, limit).await
        }
    }
}

/// Matches against your own intensity ratings for the whisky, or its published profile
/// if you haven't rated it.
async fn print_matches<B: NotesBackend, S: LocalStorage>(
    backend: &B,
    identity: &Identity<S>,
    whisky: WhiskyId,
    limit: usize,
) -> Result<()> {
    let scope = identity.read_scope();
    let whiskies = backend
        .list_whiskies(&scope)
        .await
        .wrap_err("loading whiskies")?;
    let own = backend
        .find_note(&scope, whisky)
        .await
        .wrap_err("loading your tasting note")?
        .map(|note| note.intensity_ratings)
        .filter(|ratings| !ratings.is_empty());
    let target = match own {
        Some(ratings) => ratings,
        None => whiskies
            .iter()
            .find(|it| it.id == whisky)
            .map(|it| it.flavor_profile.clone())
            .unwrap_or_default(),
    };
    if target.is_empty() {
        println!("No flavor profile for {whisky} yet, rate some intensities first");
        return Ok(());
    }

    let matches = matching::rank(&target, whiskies, Some(whisky), limit);
    if matches.is_empty() {
        println!("Nothing similar found");
    }
    for found in matches {
        let distillery = found.whisky.distillery.as_deref().unwrap_or("-");
        println!(
            "{:>5.1}%  {} ({distillery})",
            found.similarity * 100.0,
            found.whisky.name
        );
    }
    Ok(())
}
