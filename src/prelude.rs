pub use crate::config::{SquireConfig, DEFAULT_CHUNK_SIZE};
pub use crate::data_structs::columns::ColumnGroup;
pub use crate::data_structs::locus::LocusKey;
pub use crate::data_structs::record::IntervalRecord;
pub use crate::error::SquireError;
pub use crate::io::bedmethyl::{
    make_viable_path,
    read_file_of_files,
    validate_bedmethyl,
    BedMethylReader,
};
pub use crate::io::export::{
    export_cpg_list,
    export_reference_matrix,
    threshold_counts,
    write_threshold_report,
    ThresholdCount,
};
pub use crate::io::table::{TableChunks, TableWriter};
pub use crate::store::manifest::{Manifest, SampleState, TestKind};
pub use crate::store::{Store, StoreTable};
pub use crate::tools::coordinates::build_coordinate_index;
pub use crate::tools::ingest::ingest_file;
pub use crate::tools::merge::merge;
pub use crate::tools::pipeline::{add_samples, create_store, PipelineStage};
pub use crate::tools::stats::{compute_p_values, SENTINEL_P_VALUE};
pub use crate::utils::{default_n_workers, sample_id_from_path};
