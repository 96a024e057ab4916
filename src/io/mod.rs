//! Reading inputs and writing results

mod csv;
mod report;
mod results;

pub use self::csv::{
    delimited_reader, read_count_matrix, read_design_matrix, read_gene_list, read_sample_table,
    write_dispersions, write_matrix, write_results,
};
pub use report::{write_report, RunReport};
pub use results::{RankedResult, ResultRow, ResultsSummary};
