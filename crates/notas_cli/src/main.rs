//! Local-mode command-line front end.
//!
//! # Responsibility
//! - Map one subcommand onto controller actions over a SQLite slot file.
//! - Print notifications and the rendered list; exit non-zero on failures.

mod cli;

use chrono::Utc;
use clap::Parser;
use cli::{Cli, Command};
use notas_core::{
    init_logging_from, AppConfig, DraftRepository, EmptyState, ExportSnapshot, ImportMode,
    LocalNoteStore, NoteId, NoteInput, NotesController, NotesView, RenderInstruction,
    SqliteKvRepository,
};
use std::path::PathBuf;
use std::rc::Rc;

type Controller = NotesController<Rc<SqliteKvRepository>>;

struct CliError {
    code: &'static str,
    message: String,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// What one batch of render instructions amounted to.
#[derive(Default)]
struct Outcome {
    failed: bool,
    view: Option<NotesView>,
    download: Option<ExportSnapshot>,
    draft: Option<(String, String)>,
}

impl Outcome {
    fn collect(instructions: Vec<RenderInstruction>) -> Self {
        let mut outcome = Self::default();
        for instruction in instructions {
            match instruction {
                RenderInstruction::Notify(notification) => {
                    if notification.error_kind.is_some() {
                        outcome.failed = true;
                        eprintln!("[{}] {}", notification.level.as_str(), notification.message);
                    } else {
                        println!("[{}] {}", notification.level.as_str(), notification.message);
                    }
                }
                RenderInstruction::RenderNotes(view) => outcome.view = Some(view),
                RenderInstruction::OfferDownload(snapshot) => outcome.download = Some(snapshot),
                RenderInstruction::FillForm { title, content } => {
                    outcome.draft = Some((title, content));
                }
                _ => {}
            }
        }
        outcome
    }

    fn into_result(self) -> Result<Self, CliError> {
        if self.failed {
            Err(CliError::new("action_failed", "the action did not complete"))
        } else {
            Ok(self)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{}: {}", err.code, err.message);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if let Command::Version = cli.cmd {
        println!("notas {}", notas_core::core_version());
        return Ok(());
    }

    let config = load_config(&cli)?;
    if let Err(err) = init_logging_from(&config) {
        eprintln!("logging disabled: {err}");
    }
    let mut controller = open_controller(&config)?;
    controller.start().await;
    let started = Outcome::collect(controller.take_instructions());

    match cli.cmd {
        Command::List => {
            print_view(controller_view(&controller, started.view).as_ref());
            Ok(())
        }
        Command::Add { title, content } => {
            controller.save(NoteInput::new(title, content)).await;
            Outcome::collect(controller.take_instructions()).into_result()?;
            Ok(())
        }
        Command::Edit { id, title, content } => {
            let id = parse_id(&id)?;
            controller.edit(&id);
            if controller.editing() != Some(&id) {
                return Err(CliError::new("not_found", format!("no note with id `{id}`")));
            }
            controller.take_instructions();
            controller.save(NoteInput::new(title, content)).await;
            Outcome::collect(controller.take_instructions()).into_result()?;
            Ok(())
        }
        Command::Search { query } => {
            controller.search(query).await;
            let outcome = Outcome::collect(controller.take_instructions()).into_result()?;
            print_view(controller_view(&controller, outcome.view).as_ref());
            Ok(())
        }
        Command::Delete { id, yes } => {
            let id = parse_id(&id)?;
            let Some(token) = controller.request_delete(&id) else {
                return Err(CliError::new("not_found", format!("no note with id `{id}`")));
            };
            if !yes {
                controller.cancel_delete(token);
                return Err(CliError::new(
                    "confirmation_required",
                    "re-run with --yes to delete this note",
                ));
            }
            controller.confirm_delete(token).await;
            Outcome::collect(controller.take_instructions()).into_result()?;
            Ok(())
        }
        Command::Export { out } => {
            controller.export();
            let outcome = Outcome::collect(controller.take_instructions()).into_result()?;
            let Some(snapshot) = outcome.download else {
                return Ok(());
            };
            let path = out
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(&snapshot.file_name));
            std::fs::write(&path, snapshot.contents).map_err(|err| {
                CliError::new("io_error", format!("cannot write `{}`: {err}", path.display()))
            })?;
            println!("{} notas -> {}", snapshot.note_count, path.display());
            Ok(())
        }
        Command::Import {
            file,
            replace,
            append: _,
        } => {
            let contents = std::fs::read_to_string(&file)
                .map_err(|err| CliError::new("io_error", format!("cannot read `{file}`: {err}")))?;
            let Some(token) = controller.begin_import(&file, &contents) else {
                Outcome::collect(controller.take_instructions()).into_result()?;
                return Ok(());
            };
            let mode = if replace {
                ImportMode::Replace
            } else {
                ImportMode::Append
            };
            controller.resolve_import(token, Some(mode)).await;
            Outcome::collect(controller.take_instructions()).into_result()?;
            Ok(())
        }
        Command::Draft => {
            match started.draft {
                Some((title, content)) => println!("{title}\n{content}"),
                None => println!("sin borrador"),
            }
            Ok(())
        }
        Command::Version => Ok(()),
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig, CliError> {
    let mut config =
        AppConfig::from_env().map_err(|err| CliError::new("invalid_config", err.to_string()))?;
    if let Some(db) = &cli.db {
        config.db_path = PathBuf::from(db);
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir = Some(PathBuf::from(dir));
    }
    Ok(config)
}

fn open_controller(config: &AppConfig) -> Result<Controller, CliError> {
    let kv = SqliteKvRepository::open(&config.db_path).map_err(|err| {
        CliError::new(
            "db_open_failed",
            format!("cannot open `{}`: {err}", config.db_path.display()),
        )
    })?;
    let kv = Rc::new(kv);
    Ok(NotesController::local(
        LocalNoteStore::open(Rc::clone(&kv)),
        DraftRepository::new(kv),
        config.draft_autosave_delay(),
    ))
}

fn parse_id(raw: &str) -> Result<NoteId, CliError> {
    NoteId::parse(raw).ok_or_else(|| CliError::new("invalid_id", "note id cannot be blank"))
}

/// The controller only re-renders on change; rebuild the current view when
/// nothing new was emitted.
fn controller_view(controller: &Controller, emitted: Option<NotesView>) -> Option<NotesView> {
    emitted.or_else(|| {
        Some(NotesView::build(
            &controller.visible_notes(),
            controller.editing(),
            EmptyState::NoNotes,
            Utc::now(),
        ))
    })
}

fn print_view(view: Option<&NotesView>) {
    let Some(view) = view else {
        return;
    };
    if let Some(empty) = view.empty_state {
        println!("{}", empty.message());
        return;
    }
    for card in &view.cards {
        println!("{}  {}", card.id, card.title);
        println!("    {}", card.content);
        match &card.updated_label {
            Some(updated) => println!("    creada {} · editada {updated}", card.created_label),
            None => println!("    creada {}", card.created_label),
        }
    }
}
