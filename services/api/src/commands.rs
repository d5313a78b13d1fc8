use crate::infra::Runtime;
use clap::Args;
use inscrisup::admissions::export::{class_roster, mailing_list, write_csv};
use inscrisup::admissions::{
    local_now, ActionId, AdmissionRepository, AdmissionStore, BatchImporter, ClassCode,
    CsvExportFetcher, FileNumber, LedgerError, ManualProposition, PropositionId,
    PropositionStatus, ResignationOutcome, ResignationTarget,
};
use inscrisup::config::AppConfig;
use inscrisup::error::AppError;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub(crate) struct ImportArgs {
    /// Directory holding the exported admission lists (overrides INSCRISUP_SOURCE_DIR)
    #[arg(long)]
    pub(crate) source_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ActionArgs {
    /// Identifier of the action
    pub(crate) id: u64,
}

#[derive(Args, Debug)]
pub(crate) struct ResignArgs {
    /// Admission-file number of the student
    pub(crate) file: u32,
}

#[derive(Args, Debug)]
pub(crate) struct AddPropositionArgs {
    /// Admission-file number of a student already in the ledger
    #[arg(long)]
    pub(crate) file: u32,
    /// Class code as configured in INSCRISUP_CLASSES
    #[arg(long)]
    pub(crate) class: String,
    /// The student still waits for other choices
    #[arg(long)]
    pub(crate) pending: bool,
    #[arg(long)]
    pub(crate) boarding: bool,
    #[arg(long)]
    pub(crate) gap_year: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RegisteredArgs {
    /// Identifier of the proposition whose registration is complete
    pub(crate) id: u64,
}

#[derive(Args, Debug)]
pub(crate) struct RosterArgs {
    /// Class code as configured in INSCRISUP_CLASSES
    #[arg(long)]
    pub(crate) class: String,
    /// Output CSV file (defaults to stdout)
    #[arg(long)]
    pub(crate) out: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct MailingArgs {
    /// Output CSV file (defaults to stdout)
    #[arg(long)]
    pub(crate) out: Option<PathBuf>,
}

fn open_runtime() -> Result<(AppConfig, Runtime), AppError> {
    let config = AppConfig::load()?;
    inscrisup::telemetry::init(&config.telemetry)?;
    let runtime = Runtime::open(&config.admissions)?;
    Ok((config, runtime))
}

pub(crate) fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let (_, runtime) = open_runtime()?;
    let source_dir = args.source_dir.unwrap_or_else(|| runtime.source_dir.clone());

    let importer = BatchImporter::new(
        runtime.repository.clone(),
        CsvExportFetcher::new(&source_dir),
        runtime.engine.clone(),
    );
    let report = importer.run(local_now())?;

    println!("Import run #{} from {}", report.run_id, source_dir.display());
    println!("  Offers applied: {}", report.results.len());
    for result in &report.results {
        println!("    {} {}", result.file_number, result.outcome.label());
    }
    if report.failures.is_empty() {
        println!("  Rejected rows: none");
    } else {
        println!("  Rejected rows:");
        for failure in &report.failures {
            let file_number = failure
                .file_number
                .map(|file| file.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("    [{}] {}: {}", failure.class, file_number, failure.reason);
        }
    }
    println!(
        "  Resigned by absence: {}",
        report.absence_resignations.len()
    );
    Ok(())
}

pub(crate) fn run_actions_list() -> Result<(), AppError> {
    let (_, runtime) = open_runtime()?;
    let lines = runtime.repository.read(|store| {
        store
            .todo_actions()
            .into_iter()
            .map(|action| {
                let student = store
                    .student(action.student)
                    .map(|student| student.display_name())
                    .unwrap_or_default();
                format!(
                    "{:>5}  {}  {:<10} {:<30} {}{}",
                    action.id.0,
                    action.scheduled_at.format("%d/%m/%Y %H:%M"),
                    action.student.0,
                    student,
                    action.category.label(),
                    if action.note.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", action.note)
                    }
                )
            })
            .collect::<Vec<_>>()
    })?;

    if lines.is_empty() {
        println!("Nothing to do");
    }
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

type CloseAction = fn(&mut AdmissionStore, ActionId, chrono::NaiveDateTime) -> Result<bool, LedgerError>;

fn close_action(id: u64, close: CloseAction, verb: &str) -> Result<(), AppError> {
    let (_, runtime) = open_runtime()?;
    let changed = runtime
        .repository
        .transaction(|store| close(store, ActionId(id), local_now()).map_err(AppError::from))?;

    if changed {
        println!("Action {id} marked as {verb}");
    } else {
        println!("Action {id} was already closed");
    }
    Ok(())
}

pub(crate) fn run_actions_complete(args: ActionArgs) -> Result<(), AppError> {
    close_action(args.id, AdmissionStore::complete, "done")
}

pub(crate) fn run_actions_dismiss(args: ActionArgs) -> Result<(), AppError> {
    close_action(args.id, AdmissionStore::mark_not_applicable, "not applicable")
}

pub(crate) fn run_students_resign(args: ResignArgs) -> Result<(), AppError> {
    let (_, runtime) = open_runtime()?;
    let file_number = FileNumber(args.file);
    let outcome = runtime.repository.transaction(|store| {
        store
            .resign(ResignationTarget::Student(file_number), local_now())
            .map_err(AppError::from)
    })?;

    match outcome {
        ResignationOutcome::Recorded { cancelled, .. } => println!(
            "Student {file_number} resigned, {} open action(s) cancelled",
            cancelled.len()
        ),
        ResignationOutcome::AlreadyResigned { .. } => {
            println!("Student {file_number} had already resigned")
        }
        ResignationOutcome::NoProposition => {
            println!("Student {file_number} has no proposition to resign")
        }
    }
    Ok(())
}

pub(crate) fn run_propositions_add(args: AddPropositionArgs) -> Result<(), AppError> {
    let (_, runtime) = open_runtime()?;
    let entry = ManualProposition {
        file_number: FileNumber(args.file),
        class: ClassCode::new(args.class),
        status: if args.pending {
            PropositionStatus::PendingOtherChoices
        } else {
            PropositionStatus::Definitive
        },
        boarding: args.boarding,
        gap_year: args.gap_year,
        offered_at: None,
    };
    let result = runtime.repository.transaction(|store| {
        runtime
            .engine
            .apply_manual(store, &entry, local_now())
            .map_err(AppError::from)
    })?;

    println!(
        "Student {} {}, {} action(s) scheduled",
        result.file_number,
        result.outcome.label(),
        result.scheduled.len()
    );
    Ok(())
}

pub(crate) fn run_propositions_registered(args: RegisteredArgs) -> Result<(), AppError> {
    let (_, runtime) = open_runtime()?;
    let closed = runtime.repository.transaction(|store| {
        store
            .mark_registered(PropositionId(args.id), local_now())
            .map_err(AppError::from)
    })?;

    println!(
        "Proposition {} registered, {} registration action(s) closed",
        args.id,
        closed.len()
    );
    Ok(())
}

pub(crate) fn run_export_roster(args: RosterArgs) -> Result<(), AppError> {
    let (config, runtime) = open_runtime()?;
    let class = ClassCode::new(args.class);
    if !config.admissions.classes.contains(&class) {
        return Err(AppError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("class '{class}' is not configured"),
        )));
    }

    let rows = runtime.repository.read(|store| class_roster(store, &class))?;
    emit_csv(&rows, args.out)
}

pub(crate) fn run_export_mailing(args: MailingArgs) -> Result<(), AppError> {
    let (_, runtime) = open_runtime()?;
    let rows = runtime.repository.read(mailing_list)?;
    emit_csv(&rows, args.out)
}

fn emit_csv<T: Serialize>(rows: &[T], out: Option<PathBuf>) -> Result<(), AppError> {
    match out {
        Some(path) => write_csv(rows, File::create(path)?)?,
        None => write_csv(rows, io::stdout().lock())?,
    }
    Ok(())
}
