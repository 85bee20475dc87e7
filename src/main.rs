use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info, warn};

use qrcode_scan_records::config::AppConfig;
use qrcode_scan_records::db::{page_offset, Database};
use qrcode_scan_records::form::{self, ScanForm};
use qrcode_scan_records::generator::{self, GeneratorHistory, PayloadKind};
use qrcode_scan_records::logging::{init_logging, OperationTimer};
use qrcode_scan_records::models::Field;
use qrcode_scan_records::parser;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database file (overrides config and DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what the parser extracts from a payload
    Parse {
        /// Decoded QR text
        payload: String,
    },
    /// Parse a payload and store it as a scan record
    Save {
        /// Decoded QR text
        payload: String,

        /// Override the parsed email
        #[arg(long)]
        gmail: Option<String>,

        /// Override the parsed student id
        #[arg(long)]
        student_id: Option<String>,

        /// Override the parsed student name
        #[arg(long)]
        student_name: Option<String>,

        /// Override the parsed class name
        #[arg(long)]
        class_name: Option<String>,

        /// Override the parsed course name
        #[arg(long)]
        course_name: Option<String>,

        /// Override the parsed notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// List stored records, most recent first
    List {
        /// Page number, starting at 1
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Records per page (defaults to records.page_size)
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Show totals over all records
    Stats,
    /// List records for one student id
    ByStudent {
        /// Student identifier
        student_id: String,
    },
    /// List records for one course
    ByCourse {
        /// Course name
        course_name: String,
    },
    /// Generate test payloads to print as QR codes
    Generate {
        /// uuid, timestamp, random, secure or custom
        #[arg(short, long, default_value = "uuid")]
        kind: String,

        /// Prefix for custom payloads
        #[arg(long)]
        prefix: Option<String>,

        /// How many payloads to generate
        #[arg(short, long, default_value = "1")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging; keep the guard so the file writer flushes on exit
    let log_file = config.logging.file_path.as_ref().map(PathBuf::from);
    let _guard = init_logging(
        Some(&config.get_log_level()),
        log_file.as_deref(),
        config.logging.log_format()?,
    )?;

    info!("Starting qrscan");

    // Parse command line arguments
    let cli = Cli::parse();

    let database = cli.database;
    let open_db = || -> Result<Database> {
        let path = database
            .clone()
            .unwrap_or_else(|| PathBuf::from(config.get_database_path()));
        Database::open(&path, &config.database)
            .with_context(|| format!("Failed to open record store at {}", path.display()))
    };

    match cli.command {
        Commands::Parse { payload } => print_json(&parser::classify(&payload))?,
        Commands::Generate { kind, prefix, count } => generate_payloads(&config, &kind, prefix, count)?,
        Commands::Save {
            payload,
            gmail,
            student_id,
            student_name,
            class_name,
            course_name,
            notes,
        } => {
            let mut scan_form = ScanForm::from_payload(payload);
            let overrides = [
                (Field::Gmail, gmail),
                (Field::StudentId, student_id),
                (Field::StudentName, student_name),
                (Field::ClassName, class_name),
                (Field::CourseName, course_name),
                (Field::Notes, notes),
            ];
            for (field, value) in overrides {
                if let Some(value) = value {
                    scan_form.set(field, value);
                }
            }
            for warning in scan_form.warnings() {
                warn!("{warning}");
            }

            let db = open_db()?;
            let timer = OperationTimer::new("save");
            let response = form::submit(&db, scan_form.to_submission());
            timer.finish();
            print_json(&response)?;
            if !response.success {
                bail!(response.error.unwrap_or_else(|| "Saving failed".to_string()));
            }
        },
        Commands::List { page, limit } => {
            let limit = limit.unwrap_or(config.records.page_size);
            let offset = page_offset(page, limit)?;
            let db = open_db()?;
            let timer = OperationTimer::new("list");
            let records = db.list_recent(limit, offset)?;
            timer.finish();
            debug!(page, limit, count = records.len(), "Listed records");
            print_json(&records)?;
        },
        Commands::Stats => print_json(&open_db()?.stats()?)?,
        Commands::ByStudent { student_id } => print_json(&open_db()?.list_by_student_id(&student_id)?)?,
        Commands::ByCourse { course_name } => print_json(&open_db()?.list_by_course(&course_name)?)?,
    }

    Ok(())
}

#[derive(Serialize)]
struct GeneratedView {
    #[serde(flatten)]
    payload: generator::GeneratedPayload,
    image_url: String,
}

fn generate_payloads(config: &AppConfig, kind: &str, prefix: Option<String>, count: usize) -> Result<()> {
    let kind = match (kind.trim().to_ascii_lowercase().as_str(), prefix) {
        ("custom", Some(prefix)) => PayloadKind::Custom(prefix),
        ("custom", None) => bail!("--prefix is required for custom payloads"),
        (other, _) => other.parse::<PayloadKind>()?,
    };

    let mut history = GeneratorHistory::new(config.generator.history_limit);
    for _ in 0..count.max(1) {
        history.generate(kind.clone())?;
    }

    let views = history
        .iter()
        .map(|payload| {
            let image_url = generator::render_url(&payload.value, config.generator.qr_size)?.to_string();
            Ok(GeneratedView {
                payload: payload.clone(),
                image_url,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    print_json(&views)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
