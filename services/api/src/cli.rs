use crate::commands::{
    run_actions_complete, run_actions_dismiss, run_actions_list, run_export_mailing,
    run_export_roster, run_import, run_propositions_add, run_propositions_registered,
    run_students_resign, ActionArgs, AddPropositionArgs, ImportArgs, MailingArgs,
    RegisteredArgs, ResignArgs, RosterArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use inscrisup::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "inscrisup",
    about = "Track Parcoursup admissions and the enrollment paperwork they trigger",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Reconcile the exported admission lists with the ledger
    Import(ImportArgs),
    /// Inspect or close follow-up actions
    Actions {
        #[command(subcommand)]
        command: ActionsCommand,
    },
    /// Staff decisions about a student
    Students {
        #[command(subcommand)]
        command: StudentsCommand,
    },
    /// Record propositions by hand or close their registration
    Propositions {
        #[command(subcommand)]
        command: PropositionsCommand,
    },
    /// Write CSV projections of the ledger
    Export {
        #[command(subcommand)]
        command: ExportCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ActionsCommand {
    /// List every action still to do, oldest first
    List,
    /// Mark an action as done
    Complete(ActionArgs),
    /// Mark an action as not applicable
    Dismiss(ActionArgs),
}

#[derive(Subcommand, Debug)]
enum StudentsCommand {
    /// Record that the student gave up their place
    Resign(ResignArgs),
}

#[derive(Subcommand, Debug)]
enum PropositionsCommand {
    /// Enter a proposition received outside the admission lists
    Add(AddPropositionArgs),
    /// Flag a proposition as fully registered
    Registered(RegisteredArgs),
}

#[derive(Subcommand, Debug)]
enum ExportCommand {
    /// Students currently admitted in a class
    Roster(RosterArgs),
    /// Addressees still waiting for a packet
    Mailing(MailingArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Import(args) => run_import(args),
        Command::Actions {
            command: ActionsCommand::List,
        } => run_actions_list(),
        Command::Actions {
            command: ActionsCommand::Complete(args),
        } => run_actions_complete(args),
        Command::Actions {
            command: ActionsCommand::Dismiss(args),
        } => run_actions_dismiss(args),
        Command::Students {
            command: StudentsCommand::Resign(args),
        } => run_students_resign(args),
        Command::Propositions {
            command: PropositionsCommand::Add(args),
        } => run_propositions_add(args),
        Command::Propositions {
            command: PropositionsCommand::Registered(args),
        } => run_propositions_registered(args),
        Command::Export {
            command: ExportCommand::Roster(args),
        } => run_export_roster(args),
        Command::Export {
            command: ExportCommand::Mailing(args),
        } => run_export_mailing(args),
    }
}
