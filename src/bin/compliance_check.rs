//! compliance_check - run a frame-ordered detection stream against the rule
//! registry and emit a citation report.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use compliance_kernel::{EngineConfig, FrameDetections, RuleRegistry, Session};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory of per-standard rule files (overrides config).
    #[arg(long, env = "COMPLIANCE_STANDARDS_DIR")]
    standards_dir: Option<PathBuf>,
    /// Newline-delimited frame-detection JSON; '-' reads stdin.
    #[arg(long, default_value = "-")]
    input: String,
    /// Report output path; '-' writes stdout.
    #[arg(long, default_value = "-")]
    output: String,
    /// Detection-confidence floor (overrides config).
    #[arg(long)]
    confidence_floor: Option<f32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = EngineConfig::load()?;
    if let Some(dir) = args.standards_dir {
        config.standards_dir = dir;
    }
    if let Some(floor) = args.confidence_floor {
        config.confidence_floor = floor;
    }
    config.validate()?;

    let registry = RuleRegistry::load_dir(&config.standards_dir, &config.vocabulary())
        .context("failed to load rule registry")?;
    let mut session = Session::new(Arc::new(registry), config);

    let reader: Box<dyn BufRead> = if args.input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file =
            File::open(&args.input).with_context(|| format!("failed to open {}", args.input))?;
        Box::new(BufReader::new(file))
    };

    let mut frames = 0u64;
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input stream")?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: FrameDetections = serde_json::from_str(&line)
            .with_context(|| format!("invalid frame JSON on line {}", line_number + 1))?;
        match session.process_frame(&frame) {
            Ok(confirmed) => {
                frames += 1;
                for violation in &confirmed {
                    log::info!(
                        "frame {}: confirmed {} ({} {})",
                        frame.frame_id,
                        violation.rule_id,
                        violation.standard,
                        violation.citation
                    );
                }
            }
            Err(err) => log::warn!("skipping frame {}: {}", frame.frame_id, err),
        }
    }

    let report = session.finish();
    eprintln!("{}", report.summary().trim_end());
    log::info!("processed {} frame(s), {} violation(s)", frames, report.violations.len());

    if args.output == "-" {
        report.write_to(io::stdout().lock())?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output))?;
        let mut file = io::BufWriter::new(file);
        report.write_to(&mut file)?;
        file.flush().context("failed to flush report")?;
    }
    Ok(())
}
