//! Check the signatures of a PDF
//!
//! Usage:
//!   pdf_sigcheck                                   interactive mode
//!   pdf_sigcheck <file.pdf> [trust-file] [o=<export-template>] [options]
//!
//! Options:
//!   --json          print the aggregate result as JSON
//!   --full          evaluate every signature instead of stopping at the first failure
//!   --sig <name>    evaluate only the named signature
//!   --extract       write revision_<name>.pdf for every evaluated signature
//!
//! The exit status is the failure bit-field of the first failing signature
//! (1 = does not cover the whole document, 2 = modified, 4 = untrusted), 0 when every
//! signature passed, -1 on a fatal error and -2 on bad arguments.

use pdf_sigcheck::config::{ScanMode, TrustSource, VerifyConfig};
use pdf_sigcheck::session::{exit_code, AggregateResult, RevisionReport, VerificationSession, EXIT_FATAL, EXIT_USAGE};
use pdf_sigcheck::signatures::TrustStore;
use pdf_sigcheck::{RevisionRecord, Result, SignatureCatalog};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

const OUT_ARGUMENT: &str = "o=";

struct CliConfig {
    pdf_file: PathBuf,
    verify: VerifyConfig,
    json: bool,
    extract: bool,
}

impl CliConfig {
    fn from_args(args: &[String]) -> std::result::Result<Self, String> {
        let mut positional = Vec::new();
        let mut verify = VerifyConfig::new();
        let mut json = false;
        let mut extract = false;

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--json" => json = true,
                "--full" => verify = verify.with_scan_mode(ScanMode::Full),
                "--extract" => extract = true,
                "--sig" => {
                    i += 1;
                    match args.get(i) {
                        Some(name) => verify = verify.with_signature(name.clone()),
                        None => return Err("--sig needs a signature name".to_string()),
                    }
                },
                _ => positional.push(args[i].clone()),
            }
            i += 1;
        }

        if positional.len() > 3 {
            return Err("Too many parameters!".to_string());
        }
        let mut positional = positional.into_iter();
        let pdf_file = positional.next().map(PathBuf::from).ok_or("Missing PDF file")?;
        for arg in positional {
            match arg.strip_prefix(OUT_ARGUMENT) {
                Some(template) => verify = verify.with_export_template(template.trim()),
                None => verify = verify.with_trust_file(arg),
            }
        }

        Ok(Self {
            pdf_file,
            verify,
            json,
            extract,
        })
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        let status = match interactive() {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{}", e);
                EXIT_FATAL
            },
        };
        std::process::exit(status);
    }

    let cli = match CliConfig::from_args(&args) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(EXIT_USAGE);
        },
    };

    let result = run(&cli);
    match &result {
        Ok(aggregate) if cli.json => match serde_json::to_string_pretty(aggregate) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: {}", e),
        },
        Ok(aggregate) => print_summary(aggregate),
        Err(e) => eprintln!("{}", e),
    }
    std::process::exit(exit_code(&result));
}

fn run(cli: &CliConfig) -> Result<AggregateResult> {
    let mut session = VerificationSession::open(&cli.pdf_file, cli.verify.clone())?;
    let aggregate = session.run()?;
    if cli.extract {
        for report in &aggregate.evaluated {
            if let Some(record) = session.catalog().revision(&report.name) {
                record.extract(record.default_extract_path());
            }
        }
    }
    Ok(aggregate)
}

fn print_summary(aggregate: &AggregateResult) {
    for report in &aggregate.evaluated {
        print_report(report);
    }
    match &aggregate.failing_signature {
        Some(name) => println!("\nFirst failing signature: {} (status {})", name, aggregate.exit_code()),
        None if aggregate.evaluated.is_empty() => println!("No signatures found."),
        None => println!("\nAll signatures passed."),
    }
}

fn print_report(report: &RevisionReport) {
    println!();
    println!("**** {} ****", report.name);
    if let Some(subject) = &report.subject {
        println!("Subject: {}", subject);
    }
    println!("Revision {} of {}", report.revision, report.total_revisions);
    println!(
        "Signature {} whole document.",
        if report.covers_whole_document { "covers" } else { "DOES NOT cover" }
    );
    println!("Document was {}", if report.modified { "modified" } else { "not modified" });
    match (&report.outcome, &report.error) {
        (Some(outcome), _) if outcome.is_trusted() => println!("The signature is VALID"),
        (Some(outcome), _) => println!("{}", outcome),
        (None, Some(error)) => println!("Cannot check signature: {}", error),
        (None, None) => {},
    }
    for path in &report.exported {
        println!("Exported {}", path.display());
    }
}

fn prompt(lines: &mut impl Iterator<Item = io::Result<String>>, text: &str) -> io::Result<String> {
    print!("{}", text);
    io::stdout().flush()?;
    Ok(lines.next().transpose()?.unwrap_or_default().trim().to_string())
}

fn interactive() -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    let pdf_file = prompt(&mut lines, "PDF filename: ")?;
    let trust_file = prompt(&mut lines, "Self signed cert (blank for global CA store): ")?;
    let trust_source = if trust_file.is_empty() {
        println!("Using global Key Store...");
        TrustSource::Default
    } else {
        println!("Using your certificate...");
        TrustSource::File(PathBuf::from(trust_file))
    };
    let trust_store = match &trust_source {
        TrustSource::Default => TrustStore::load_default()?,
        TrustSource::File(path) => TrustStore::load_from_file(path)?,
    };
    let catalog = SignatureCatalog::open(&pdf_file, Arc::new(trust_store))?;

    println!("Found revisions:");
    for name in catalog.signature_names() {
        println!("{}", name);
    }
    println!();
    let choice = prompt(&mut lines, "Choose signature name (blank for all): ")?;

    if choice.is_empty() {
        println!("Checking all revisions");
        for record in catalog.revisions() {
            print_and_verify(&catalog, Some(record));
        }
    } else {
        print_and_verify(&catalog, catalog.revision(&choice));
    }
    Ok(())
}

fn print_and_verify(catalog: &SignatureCatalog, record: Option<&RevisionRecord>) {
    let Some(record) = record else {
        println!("No such signature name.");
        return;
    };
    println!();
    println!("**** {} ****", record.name());
    match record.subject() {
        Ok(subject) => println!("Subject: {}", subject),
        Err(e) => println!("Subject: unavailable ({})", e),
    }
    println!("Revision {} of {}", record.revision_number(), catalog.total_revisions());
    println!(
        "Signature {} whole document.",
        if record.signature_covers_whole_document() { "covers" } else { "DOES NOT cover" }
    );
    match record.is_document_modified() {
        Ok(modified) => println!("Document was {}", if modified { "modified" } else { "not modified" }),
        Err(e) => println!("Document modification cannot be checked: {}", e),
    }
    println!("Checking validity...");
    match record.verify(None) {
        Ok(outcome) if outcome.is_trusted() => println!("The signature is VALID"),
        Ok(outcome) => println!("{}", outcome),
        Err(e) => println!("{}", e),
    }
}
