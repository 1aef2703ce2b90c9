mod common;

pub mod assemble_output;
pub mod batch_process_machine;
pub mod extract_corpusid;
pub mod import_citations;
pub mod import_gz_to_temp;
pub mod import_papers_title;
pub mod init_table;
pub mod init_temp_table;
pub mod merge_citations_to_full_data;
