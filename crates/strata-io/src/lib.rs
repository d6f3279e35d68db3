pub mod arc_file;
pub mod external_pq;
pub mod level_merger;
pub mod levelized_pq;
pub mod memory;
pub mod node_file;
pub mod record;
pub mod scratch;
pub mod sorter;
pub mod stream;

// Re-export commonly used types
pub use arc_file::{ArcFile, ArcFileMeta, ArcWriter};
pub use external_pq::{ExternalPq, SecondaryPq};
pub use level_merger::{GeneratorLevels, LevelMerger, LevelStream};
pub use levelized_pq::LevelizedPq;
pub use node_file::{NodeFile, NodeFileMeta, NodeRandomAccess, NodeWriter, SharedNodeFile};
pub use record::Record;
pub use sorter::{SortedStream, Sorter};
pub use stream::{RecordReader, RecordStream, RecordWriter, ReverseRecordReader};
