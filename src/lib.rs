//! machoscope: structural Mach-O parsing and transactional in-place editing.
//!
//! ```no_run
//! use machoscope::{parse_container, AnalyzerConfig};
//!
//! let data = std::fs::read("a.out").unwrap();
//! let model = parse_container(&data, &AnalyzerConfig::default().parser).unwrap();
//! for slice in &model.slices {
//!     println!("{} {} commands", slice.slice.arch, slice.load_commands.len());
//! }
//! ```

/// Cross-references, hex-range labelling and layout data
pub mod analysis;
pub mod config;
/// Disassembly boundary
pub mod disasm;
/// Fixed-width edits with backup, verification and undo
pub mod edit;
pub mod error;
pub mod formats;
pub mod hashing;
pub mod io;
pub mod logging;
/// Metadata persistence boundary
pub mod store;
pub mod timeout;

pub use analysis::hex_range::{read_bytes, HexRange, Interpretation};
pub use analysis::xrefs::{EntityRef, XRef, XRefKind};
pub use config::{AnalyzerConfig, EditConfig, IoConfig, ParserConfig, ProtectedRegionPolicy};
pub use edit::{EditEngine, EditRecord, EditStatus, EditTarget, FieldValue};
pub use error::{MachoError, Result};
pub use formats::macho::{parse_container, Container, MachoParser, MachoSlice};
pub use io::{ByteRange, ByteSource, IOLimits};
pub use timeout::CancellationToken;
