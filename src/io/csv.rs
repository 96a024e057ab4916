//! Delimited-file reading and writing for counts, sample tables and results
//!
//! Inputs may be tab- or comma-delimited; the delimiter is taken from the
//! header line. Outputs are always tab-delimited.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ndarray::{Array2, ArrayView2};

use super::results::RankedResult;
use crate::data::{CountMatrix, SampleDesign, SampleTable};
use crate::dispersion::DispersionEstimate;
use crate::error::{EdgerError, Result};

fn detect_delimiter(path: &Path) -> Result<u8> {
    let mut first = String::new();
    BufReader::new(File::open(path)?).read_line(&mut first)?;
    if first.trim().is_empty() {
        return Err(EdgerError::EmptyData {
            reason: format!("{} is empty", path.display()),
        });
    }
    Ok(if first.contains('\t') { b'\t' } else { b',' })
}

/// Open a delimited file with a header row
pub fn delimited_reader(path: &Path) -> Result<::csv::Reader<File>> {
    let delimiter = detect_delimiter(path)?;
    Ok(::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_path(path)?)
}

fn tab_writer(path: &Path) -> Result<::csv::Writer<File>> {
    Ok(::csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?)
}

/// Header and rows of a table whose first column is an identifier
struct LabelledTable {
    columns: Vec<String>,
    row_ids: Vec<String>,
    rows: Vec<Vec<String>>,
}

fn read_labelled_table(path: &Path, what: &str) -> Result<LabelledTable> {
    let mut reader = delimited_reader(path)?;
    let header = reader.headers()?.clone();
    if header.len() < 2 {
        return Err(EdgerError::EmptyData {
            reason: format!("{} {} has no data columns", what, path.display()),
        });
    }
    let columns: Vec<String> = header.iter().skip(1).map(str::to_string).collect();

    let mut row_ids = Vec::new();
    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        if record.len() != columns.len() + 1 {
            return Err(EdgerError::DimensionMismatch {
                expected: format!("{} fields in {} row {}", columns.len() + 1, what, line + 2),
                got: format!("{} fields", record.len()),
            });
        }
        row_ids.push(record[0].to_string());
        rows.push(record.iter().skip(1).map(str::to_string).collect());
    }

    if row_ids.is_empty() {
        return Err(EdgerError::EmptyData {
            reason: format!("{} {} has no rows", what, path.display()),
        });
    }
    Ok(LabelledTable {
        columns,
        row_ids,
        rows,
    })
}

fn numeric_matrix(table: &LabelledTable, what: &str) -> Result<Array2<f64>> {
    let mut matrix = Array2::zeros((table.row_ids.len(), table.columns.len()));
    for (i, row) in table.rows.iter().enumerate() {
        for (j, field) in row.iter().enumerate() {
            matrix[[i, j]] = field.parse::<f64>().map_err(|_| EdgerError::InvalidCountMatrix {
                reason: format!(
                    "{} value '{}' for '{}' / '{}' is not a number",
                    what, field, table.row_ids[i], table.columns[j]
                ),
            })?;
        }
    }
    Ok(matrix)
}

/// Read a count matrix. First row holds sample IDs, first column gene IDs.
pub fn read_count_matrix<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let table = read_labelled_table(path.as_ref(), "count table")?;
    let counts = numeric_matrix(&table, "count")?;
    log::info!(
        "Read {} genes x {} samples from {}",
        table.row_ids.len(),
        table.columns.len(),
        path.as_ref().display()
    );
    CountMatrix::new(counts, table.row_ids, table.columns)
}

/// Read sample metadata. First column is the sample ID, remaining columns are factors.
pub fn read_sample_table<P: AsRef<Path>>(path: P) -> Result<SampleTable> {
    let table = read_labelled_table(path.as_ref(), "sample table")?;
    let mut samples = SampleTable::new(table.row_ids)?;
    for (j, name) in table.columns.iter().enumerate() {
        let values: Vec<String> = table.rows.iter().map(|r| r[j].clone()).collect();
        samples.add_column(name, values)?;
    }
    Ok(samples)
}

/// Read a numeric design matrix. First column is the sample ID, header names the coefficients.
pub fn read_design_matrix<P: AsRef<Path>>(path: P) -> Result<SampleDesign> {
    let table = read_labelled_table(path.as_ref(), "design matrix")?;
    let matrix = numeric_matrix(&table, "design").map_err(|e| match e {
        EdgerError::InvalidCountMatrix { reason } => EdgerError::InvalidDesignMatrix { reason },
        other => other,
    })?;
    SampleDesign::new(matrix, table.columns, table.row_ids)
}

/// Read gene identifiers, one per line. Blank lines and `#` comments are skipped.
pub fn read_gene_list<P: AsRef<Path>>(path: P) -> Result<HashSet<String>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(::csv::Trim::All)
        .from_path(path.as_ref())?;
    let mut ids = HashSet::new();
    for record in reader.records() {
        let record = record?;
        if let Some(id) = record.get(0).filter(|s| !s.is_empty()) {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}

/// Write ranked results as a tab-delimited table
pub fn write_results<P: AsRef<Path>>(path: P, results: &RankedResult) -> Result<()> {
    let mut writer = tab_writer(path.as_ref())?;
    writer.write_record([
        "gene_id",
        "symbol",
        "description",
        "logFC",
        "logCPM",
        "LR",
        "PValue",
        "FDR",
        "converged",
    ])?;
    for row in &results.rows {
        writer.write_record([
            row.gene_id.clone(),
            row.symbol.clone(),
            row.description.clone(),
            format!("{:.6}", row.log_fc),
            format!("{:.6}", row.log_cpm),
            format!("{:.6}", row.lr),
            format!("{:.6e}", row.p_value),
            format!("{:.6e}", row.fdr),
            row.converged.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a labelled matrix such as log-CPM values or fitted means
pub fn write_matrix<P: AsRef<Path>>(
    path: P,
    row_ids: &[String],
    column_ids: &[String],
    matrix: ArrayView2<f64>,
) -> Result<()> {
    if matrix.dim() != (row_ids.len(), column_ids.len()) {
        return Err(EdgerError::DimensionMismatch {
            expected: format!("{} x {} matrix", row_ids.len(), column_ids.len()),
            got: format!("{} x {}", matrix.nrows(), matrix.ncols()),
        });
    }
    let mut writer = tab_writer(path.as_ref())?;
    let mut header = vec!["gene_id".to_string()];
    header.extend(column_ids.iter().cloned());
    writer.write_record(&header)?;
    for (id, row) in row_ids.iter().zip(matrix.rows()) {
        let mut record = vec![id.clone()];
        record.extend(row.iter().map(|v| format!("{:.6}", v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write per-gene dispersion estimates
pub fn write_dispersions<P: AsRef<Path>>(path: P, estimate: &DispersionEstimate) -> Result<()> {
    let mut writer = tab_writer(path.as_ref())?;
    writer.write_record(["gene_id", "aveLogCPM", "raw", "trended", "tagwise"])?;
    for (i, id) in estimate.gene_ids.iter().enumerate() {
        writer.write_record([
            id.clone(),
            format!("{:.6}", estimate.ave_log_cpm[i]),
            format!("{:.6e}", estimate.raw[i]),
            format!("{:.6e}", estimate.trended[i]),
            format!("{:.6e}", estimate.tagwise[i]),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{ResultRow, RankedResult};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_count_matrix_tab() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2\ts3").unwrap();
        writeln!(file, "gene1\t100\t200\t150").unwrap();
        writeln!(file, "gene2\t50\t75\t60").unwrap();
        file.flush().unwrap();

        let matrix = read_count_matrix(file.path()).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.sample_ids()[2], "s3");
    }

    #[test]
    fn test_read_count_matrix_comma_quoted() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "\"gene\",\"a\",\"b\"").unwrap();
        writeln!(file, "\"g1\",1,2").unwrap();
        file.flush().unwrap();

        let matrix = read_count_matrix(file.path()).unwrap();
        assert_eq!(matrix.gene_ids()[0], "g1");
        assert_eq!(matrix.sample_ids()[1], "b");
    }

    #[test]
    fn test_ragged_row_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2").unwrap();
        writeln!(file, "gene1\t1").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            read_count_matrix(file.path()),
            Err(EdgerError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_non_numeric_count_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2").unwrap();
        writeln!(file, "gene1\t1\tNA").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            read_count_matrix(file.path()),
            Err(EdgerError::InvalidCountMatrix { .. })
        ));
    }

    #[test]
    fn test_read_design_and_sample_table() {
        let mut design = NamedTempFile::new().unwrap();
        writeln!(design, "sample,intercept,treated").unwrap();
        writeln!(design, "s1,1,0").unwrap();
        writeln!(design, "s2,1,0").unwrap();
        writeln!(design, "s3,1,1").unwrap();
        design.flush().unwrap();
        let d = read_design_matrix(design.path()).unwrap();
        assert_eq!(d.n_coefs(), 2);
        assert_eq!(d.column_names()[1], "treated");

        let mut samples = NamedTempFile::new().unwrap();
        writeln!(samples, "sample\tgroup\tbatch").unwrap();
        writeln!(samples, "s1\tctrl\tA").unwrap();
        writeln!(samples, "s2\ttrt\tB").unwrap();
        samples.flush().unwrap();
        let t = read_sample_table(samples.path()).unwrap();
        assert_eq!(t.column_names(), vec!["group", "batch"]);
        assert_eq!(t.column("batch").unwrap()[1], "B");
    }

    #[test]
    fn test_read_gene_list() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# mitochondrial").unwrap();
        writeln!(file, "MT-CO1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "MT-ND1").unwrap();
        file.flush().unwrap();
        let ids = read_gene_list(file.path()).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("MT-ND1"));
    }

    #[test]
    fn test_write_results_header_and_rows() {
        let results = RankedResult {
            contrast: "group".to_string(),
            rows: vec![ResultRow {
                gene_id: "g1".to_string(),
                log_fc: 1.5,
                log_cpm: 7.25,
                lr: 20.0,
                p_value: 1e-5,
                fdr: 2e-5,
                converged: true,
                symbol: "ABC".to_string(),
                description: String::new(),
            }],
            warnings: Vec::new(),
        };
        let file = NamedTempFile::new().unwrap();
        write_results(file.path(), &results).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "gene_id\tsymbol\tdescription\tlogFC\tlogCPM\tLR\tPValue\tFDR\tconverged");
        assert!(lines[1].starts_with("g1\tABC\t\t1.500000\t7.250000"));
    }
}
