//! rust_edger command-line interface

use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;

use clap::Parser;
use log::{info, LevelFilter};

use rust_edger::annotation::TableAnnotations;
use rust_edger::cli::{parse_contrast, parse_reference_levels, Cli, CommonArgs, Commands};
use rust_edger::prelude::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Some(Commands::Run {
            common,
            metadata,
            factors,
            reference,
            design_matrix,
            contrast,
            annotation,
            fdr,
            output,
            report,
            dispersions,
            fitted,
        }) => run_analysis(RunOptions {
            common,
            metadata,
            factors,
            reference,
            design_matrix,
            contrast,
            annotation,
            fdr,
            output,
            report,
            dispersions,
            fitted,
        }),
        Some(Commands::Normalize {
            common,
            prior_count,
            output,
            factors,
        }) => run_normalize(&common, prior_count, &output, factors.as_deref()),
        None => {
            print_no_args();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error ({:?}): {}", e.category(), e);
        std::process::exit(1);
    }
}

fn print_no_args() {
    println!("rust_edger v{}", VERSION);
    println!("Run `rust_edger -h` for usage or `rust_edger <COMMAND> --help` for details.");
}

struct RunOptions {
    common: CommonArgs,
    metadata: Option<String>,
    factors: Vec<String>,
    reference: Vec<String>,
    design_matrix: Option<String>,
    contrast: Option<String>,
    annotation: Option<String>,
    fdr: Option<f64>,
    output: String,
    report: Option<String>,
    dispersions: Option<String>,
    fitted: Option<String>,
}

fn load_exclusions(path: Option<&str>) -> Result<HashSet<String>> {
    match path {
        Some(path) => {
            let ids = read_gene_list(path)?;
            info!("Loaded {} gene IDs to exclude from {}", ids.len(), path);
            Ok(ids)
        }
        None => Ok(HashSet::new()),
    }
}

fn load_design(opts: &RunOptions) -> Result<SampleDesign> {
    if let Some(path) = &opts.design_matrix {
        info!("Loading design matrix from: {}", path);
        return read_design_matrix(path);
    }
    let path = opts.metadata.as_deref().ok_or_else(|| EdgerError::InvalidConfig {
        reason: "either --design-matrix or --metadata with --factor is required".to_string(),
    })?;
    if opts.factors.is_empty() {
        return Err(EdgerError::InvalidConfig {
            reason: "--metadata needs at least one --factor".to_string(),
        });
    }
    info!("Loading sample table from: {}", path);
    let table = read_sample_table(path)?;
    let references = parse_reference_levels(&opts.reference)?;
    let design = encode_factors(&table, &opts.factors, &references)?;
    info!("Design columns: {}", design.column_names().join(", "));
    Ok(design)
}

fn run_analysis(opts: RunOptions) -> Result<()> {
    let mut config = opts.common.pipeline_config()?;
    if let Some(fdr) = opts.fdr {
        config.fdr_threshold = fdr;
    }

    info!("Loading count matrix from: {}", opts.common.counts);
    let counts = read_count_matrix(&opts.common.counts)?;
    let exclude = load_exclusions(opts.common.exclude.as_deref())?;
    let design = load_design(&opts)?;
    let contrast = parse_contrast(opts.contrast.as_deref(), &design)?;

    let mut analysis = run_pipeline(&counts, &design, &exclude, &contrast, &config)?;

    if let Some(path) = &opts.annotation {
        let annotations = TableAnnotations::from_path(path)?;
        analysis.results.annotate(&annotations);
    }

    info!("Writing results to: {}", opts.output);
    write_results(&opts.output, &analysis.results)?;

    if let Some(path) = &opts.dispersions {
        write_dispersions(path, &analysis.dispersions)?;
    }
    if let Some(path) = &opts.fitted {
        write_matrix(
            path,
            &analysis.fit.gene_ids,
            analysis.filtered.counts.sample_ids(),
            analysis.fit.fitted.view(),
        )?;
    }
    if let Some(path) = &opts.report {
        write_report(path, &analysis.report(&config))?;
    }

    println!("{}", analysis.results.summary(config.fdr_threshold));
    info!("Done!");
    Ok(())
}

fn run_normalize(
    common: &CommonArgs,
    prior_count: f64,
    output_path: &str,
    factors_path: Option<&str>,
) -> Result<()> {
    let config = common.pipeline_config()?;

    info!("Loading count matrix from: {}", common.counts);
    let counts = read_count_matrix(&common.counts)?;
    let exclude = load_exclusions(common.exclude.as_deref())?;

    let normalized = normalize(&counts, &exclude, &config)?;
    let kept = &normalized.filtered.counts;
    info!(
        "{} genes retained ({} excluded, {} low expression)",
        kept.n_genes(),
        normalized.filtered.excluded.len(),
        normalized.filtered.low_expression.len()
    );

    let values = log_cpm(
        kept.counts(),
        &normalized.normalization.effective_library_sizes(),
        prior_count,
    )?;
    info!("Writing log2 CPM to: {}", output_path);
    write_matrix(output_path, kept.gene_ids(), kept.sample_ids(), values.view())?;

    if let Some(path) = factors_path {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &normalized.normalization)?;
        info!("Wrote normalization factors to: {}", path);
    }

    info!("Done!");
    Ok(())
}
