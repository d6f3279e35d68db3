pub mod arc;
pub mod cut;
pub mod error;
pub mod exec;
pub mod func;
pub mod level_info;
pub mod node;
pub mod order;
pub mod ptr;
pub mod request;
pub mod uid;

// Re-export commonly used types
pub use arc::Arc;
pub use cut::{CutType, Cuts};
pub use error::{Error, Result};
pub use exec::{AccessMode, ExecPolicy, MemoryMode, QuantifyAlgorithm};
pub use func::gen_from_iter;
pub use level_info::LevelInfo;
pub use node::{Children, Node};
pub use order::{Direction, ItemCmp, Leveled};
pub use ptr::{Id, Level, Ptr, MAX_ID, MAX_LEVEL};
pub use request::{
    CarriedRequest, IntercutOrder, IntercutRequest, Request, RequestFstOrder,
    RequestPositionalOrder, RequestSndOrder, Target,
};
pub use uid::Uid;
