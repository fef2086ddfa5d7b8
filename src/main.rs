mod cli;

use datamosh::config;
use datamosh::pipeline::{Decision, ProcessingState, Prompt};
use datamosh::probe::{self, ProbeReport};
use datamosh::processor::{self, MoshOptions};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "datamosh=trace,datamosh_h264=debug,datamosh_media=debug".to_string()
        } else {
            "datamosh=info,datamosh_h264=warn,datamosh_media=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Mosh {
            input,
            output,
            interactive,
            debug,
            dry_run,
        } => mosh_file(
            &input,
            output.as_deref(),
            cli.config.as_deref(),
            interactive,
            debug,
            dry_run,
        ),
        Commands::Probe { file, json, units } => {
            probe_file(&file, cli.config.as_deref(), json, units)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("datamosh {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn mosh_file(
    input: &Path,
    output: Option<&Path>,
    config_path: Option<&Path>,
    interactive: bool,
    debug: bool,
    dry_run: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => processor::default_output_path(input, &config.mosh.output_suffix),
    };
    if output == input {
        anyhow::bail!("Output would overwrite the input: {:?}", output);
    }

    let options = MoshOptions {
        interactive: interactive || config.mosh.interactive,
        debug: debug || config.mosh.debug,
        classify: config.mosh.classify,
        dry_run,
        truncation: config.mosh.truncated_records,
    };

    tracing::info!("Processing file: {:?}", input);
    let result = if options.interactive && !dry_run {
        processor::mosh_file(input, &output, &options, Prompt::stdio())
    } else {
        processor::mosh_file(input, &output, &options, Decision::Yes)
    };

    let report = match result {
        Ok(report) => report,
        Err(datamosh::Error::Aborted(aborted)) => {
            print_counters(&aborted.state);
            println!("No output written.");
            return Err(datamosh::Error::Aborted(aborted).into());
        }
        Err(e) => return Err(e.into()),
    };

    if options.classify && !report.state.frame_counts.is_empty() {
        let frames: Vec<String> = report
            .state
            .frame_counts
            .iter()
            .map(|(frame, count)| format!("{}={}", frame, count))
            .collect();
        println!("Slices: {}", frames.join(" "));
    }
    print_counters(&report.state);

    match report.output {
        Some(path) => println!("File processed and available as {}", path.display()),
        None => println!(
            "\n[DRY RUN] Would remove {} I-frames into {}",
            report.state.i_frame_count.saturating_sub(1),
            output.display()
        ),
    }

    Ok(())
}

fn print_counters(state: &ProcessingState) {
    println!("Total I-frames: {}", state.i_frame_count);
    println!("Total I-frames removed: {}", state.i_frame_removed_count);
}

fn probe_file(file: &Path, config_path: Option<&Path>, json: bool, units: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let show_units = units || config.probe.show_units;
    let report = probe::probe_file(file, show_units, config.mosh.truncated_records)?;

    if json {
        let json_str = serde_json::to_string_pretty(&report)?;
        println!("{}", json_str);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &ProbeReport) {
    println!("File: {}", report.file_path.display());
    println!("Size: {} bytes", report.file_size);
    println!("Duration: {:.2}s", report.duration_secs);
    println!("Faststart: {}", report.faststart);

    println!("\nTracks: {}", report.tracks.len());
    for track in &report.tracks {
        print!("  [{}] {}", track.track_id, track.handler);
        if let Some(ref codec) = track.codec {
            print!(" {}", codec);
        }
        if let (Some(width), Some(height)) = (track.width, track.height) {
            print!(" {}x{}", width, height);
        }
        if track.encrypted {
            print!(" (encrypted)");
        }
        println!();
        println!(
            "      {} samples in {} chunks, {} sync, {:.2}s",
            track.samples, track.chunks, track.sync_samples, track.duration_secs
        );
        if let Some(ref avc) = track.avc {
            println!(
                "      avcC: profile {} level {}, {}-byte NAL lengths",
                avc.profile, avc.level, avc.nal_length_size
            );
        }
        if let Some(ref sps) = track.sps {
            println!("      SPS: {} @ level {}", sps.profile_name(), sps.level());
        }
        if let Some(ref nal) = track.nal {
            println!("      NAL units: {}, I-frames: {}", nal.units, nal.i_frames);
            for (frame, count) in &nal.frame_types {
                println!("        {} slices: {}", frame, count);
            }
            if nal.unparsed_slices > 0 {
                println!("        unparsed slices: {}", nal.unparsed_slices);
            }
        }
    }

    if !report.units.is_empty() {
        println!("\nNAL units: {}", report.units.len());
        for entry in &report.units {
            let unit = &entry.unit;
            print!(
                "  #{:<6} {:>10} +{:<8} type {:>2} {}",
                unit.sample, unit.offset, unit.length, unit.nal_type, entry.kind
            );
            if let Some(frame) = entry.frame_type {
                print!(" [{}]", frame);
            }
            println!();
        }
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_mosh_settings(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            print_mosh_settings(&config);
        }
    }

    Ok(())
}

fn print_mosh_settings(config: &config::Config) {
    println!("  Interactive: {}", config.mosh.interactive);
    println!("  Debug: {}", config.mosh.debug);
    println!("  Classify: {}", config.mosh.classify);
    println!("  Output suffix: {}", config.mosh.output_suffix);
    println!("  Truncated records: {:?}", config.mosh.truncated_records);
    println!("  Probe shows units: {}", config.probe.show_units);
}
