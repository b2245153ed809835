use clap::{ArgGroup, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "notas")]
#[command(about = "Notas local notebook CLI")]
pub struct Cli {
    /// SQLite file holding the note and draft slots.
    #[arg(long, global = true)]
    pub db: Option<String>,
    /// Absolute directory for rolling log files.
    #[arg(long = "log-dir", global = true)]
    pub log_dir: Option<String>,
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Shows every note, newest first.
    List,
    Add {
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
    },
    Edit {
        id: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
    },
    Search {
        query: String,
    },
    Delete {
        id: String,
        /// Confirms the deletion without prompting.
        #[arg(long)]
        yes: bool,
    },
    Export {
        /// Target file; defaults to the dated backup name in the working directory.
        #[arg(long)]
        out: Option<String>,
    },
    #[command(group(ArgGroup::new("mode").required(true).args(["replace", "append"])))]
    Import {
        file: String,
        #[arg(long)]
        replace: bool,
        #[arg(long)]
        append: bool,
    },
    /// Prints the restored draft, if any.
    Draft,
    Version,
}
