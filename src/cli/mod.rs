//! Command-line interface for rust_edger

use clap::{Parser, Subcommand};

use crate::config::PipelineConfig;
use crate::data::SampleDesign;
use crate::error::{EdgerError, Result};
use crate::testing::ContrastSpec;

#[derive(Parser)]
#[command(name = "rust_edger")]
#[command(version)]
#[command(about = "Negative binomial GLM differential expression for RNA-seq counts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Options shared by every subcommand that filters and normalizes
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Path to count table (tab or comma delimited)
    #[arg(short, long,
        long_help = "Path to count table.\n\
            Format: first column = gene IDs, remaining columns = raw counts per sample.\n\
            Supports both CSV (comma) and TSV (tab) delimiters (auto-detected).")]
    pub counts: String,

    /// Gene IDs to drop before filtering, one per line
    #[arg(long, value_name = "FILE")]
    pub exclude: Option<String>,

    /// JSON configuration file; command-line options override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,

    /// Minimum log2 CPM for a gene to count as expressed in a sample
    #[arg(long)]
    pub min_log_cpm: Option<f64>,

    /// Number of samples in which a gene must be expressed
    #[arg(long)]
    pub min_samples: Option<usize>,

    /// Number of threads (0 = auto)
    #[arg(short, long)]
    pub threads: Option<usize>,
}

impl CommonArgs {
    /// Load the configuration file, if any, then apply command-line overrides
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(v) = self.min_log_cpm {
            config.filter.min_log_cpm = v;
        }
        if let Some(v) = self.min_samples {
            config.filter.min_samples = v;
        }
        if let Some(v) = self.threads {
            config.threads = v;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full analysis: filter, TMM, dispersions, GLM, LRT, FDR
    #[command(
        long_about = "Run the full differential expression analysis\n\n\
            Filters lowly expressed genes, computes TMM normalization factors,\n\
            estimates common, trended and tagwise dispersions, fits a negative\n\
            binomial GLM per gene and tests one contrast by likelihood ratio.",
        after_long_help = "\
Examples:
  # Two-group comparison from a sample table
  rust_edger run -c counts.tsv -m samples.tsv -f group -o results.tsv

  # Explicit design matrix and contrast vector
  rust_edger run -c counts.tsv --design-matrix design.tsv --contrast 0,1,-1

  # Batch-adjusted design, annotated output and JSON report
  rust_edger run -c counts.tsv -m samples.tsv -f batch -f group \\
    --reference group=control --annotation genes.tsv --report run.json"
    )]
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Sample table used to build a treatment-coded design
        #[arg(short, long, conflicts_with = "design_matrix")]
        metadata: Option<String>,

        /// Factor column of the sample table (repeatable, in design order)
        #[arg(short, long = "factor", value_name = "COLUMN", requires = "metadata")]
        factors: Vec<String>,

        /// Reference level for a factor, as FACTOR=LEVEL (repeatable)
        #[arg(long, value_name = "FACTOR=LEVEL")]
        reference: Vec<String>,

        /// Numeric design matrix with a header of coefficient names
        #[arg(long, value_name = "FILE")]
        design_matrix: Option<String>,

        /// Coefficient name or index, or comma-separated contrast weights.
        /// Defaults to the last design column.
        #[arg(long)]
        contrast: Option<String>,

        /// Annotation table: gene ID, symbol, description
        #[arg(long, value_name = "FILE")]
        annotation: Option<String>,

        /// FDR threshold for the summary
        #[arg(long)]
        fdr: Option<f64>,

        /// Output path for the results table
        #[arg(short, long, default_value = "edger_results.tsv")]
        output: String,

        /// Write a JSON run report
        #[arg(long, value_name = "FILE")]
        report: Option<String>,

        /// Write per-gene dispersion estimates
        #[arg(long, value_name = "FILE")]
        dispersions: Option<String>,

        /// Write fitted means of the full model
        #[arg(long, value_name = "FILE")]
        fitted: Option<String>,
    },

    /// Filter, TMM-normalize and write log2 CPM values
    Normalize {
        #[command(flatten)]
        common: CommonArgs,

        /// Prior count added before taking logs
        #[arg(long, default_value_t = 2.0)]
        prior_count: f64,

        /// Output path for the log2 CPM table
        #[arg(short, long, default_value = "log_cpm.tsv")]
        output: String,

        /// Write normalization factors as JSON
        #[arg(long, value_name = "FILE")]
        factors: Option<String>,
    },
}

/// Parse `FACTOR=LEVEL` pairs
pub fn parse_reference_levels(pairs: &[String]) -> Result<std::collections::HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((factor, level)) if !factor.is_empty() && !level.is_empty() => {
                Ok((factor.trim().to_string(), level.trim().to_string()))
            }
            _ => Err(EdgerError::InvalidConfig {
                reason: format!("reference level '{}' is not of the form FACTOR=LEVEL", pair),
            }),
        })
        .collect()
}

/// Interpret a contrast argument against the design's original columns.
///
/// Comma-separated numbers are a weight vector, a bare integer is a column
/// index, anything else is a column name. No argument selects the last column.
pub fn parse_contrast(arg: Option<&str>, design: &SampleDesign) -> Result<ContrastSpec> {
    let names = design.original_column_names();
    let Some(arg) = arg.map(str::trim) else {
        return Ok(ContrastSpec::Coefficient(names.len().saturating_sub(1)));
    };

    if arg.contains(',') {
        let weights = arg
            .split(',')
            .map(|w| {
                w.trim().parse::<f64>().map_err(|_| EdgerError::InvalidContrast {
                    reason: format!("contrast weight '{}' is not a number", w.trim()),
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        return Ok(ContrastSpec::Vector(weights));
    }
    if let Ok(index) = arg.parse::<usize>() {
        return Ok(ContrastSpec::Coefficient(index));
    }
    names
        .iter()
        .position(|n| n == arg)
        .map(ContrastSpec::Coefficient)
        .ok_or_else(|| EdgerError::InvalidContrast {
            reason: format!(
                "'{}' is not a design column; available: {}",
                arg,
                names.join(", ")
            ),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn design() -> SampleDesign {
        SampleDesign::new(
            array![[1.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0]],
            vec!["(Intercept)".to_string(), "group_trt".to_string()],
            (1..=4).map(|i| format!("s{}", i)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_contrast_forms() {
        let d = design();
        assert_eq!(parse_contrast(None, &d).unwrap(), ContrastSpec::Coefficient(1));
        assert_eq!(parse_contrast(Some("0"), &d).unwrap(), ContrastSpec::Coefficient(0));
        assert_eq!(parse_contrast(Some("group_trt"), &d).unwrap(), ContrastSpec::Coefficient(1));
        assert_eq!(
            parse_contrast(Some("0, 1"), &d).unwrap(),
            ContrastSpec::Vector(vec![0.0, 1.0])
        );
        assert!(parse_contrast(Some("batch"), &d).is_err());
        assert!(parse_contrast(Some("0,x"), &d).is_err());
    }

    #[test]
    fn test_parse_reference_levels() {
        let refs = parse_reference_levels(&["group=ctrl".to_string()]).unwrap();
        assert_eq!(refs["group"], "ctrl");
        assert!(parse_reference_levels(&["group".to_string()]).is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = CommonArgs {
            counts: "counts.tsv".to_string(),
            min_samples: Some(4),
            threads: Some(3),
            ..Default::default()
        };
        let config = args.pipeline_config().unwrap();
        assert_eq!(config.filter.min_samples, 4);
        assert_eq!(config.threads, 3);
        assert_eq!(config.fdr_threshold, 0.05);
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "rust_edger", "run", "-c", "counts.tsv", "-m", "samples.tsv", "-f", "group",
            "--reference", "group=ctrl", "-t", "2",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Run { common, factors, reference, .. }) => {
                assert_eq!(common.threads, Some(2));
                assert_eq!(factors, vec!["group".to_string()]);
                assert_eq!(reference, vec!["group=ctrl".to_string()]);
            }
            _ => panic!("expected run subcommand"),
        }
    }
}
