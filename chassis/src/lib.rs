//! The type hierarchy, dispatch-table and metadata-blob core of a class-file-to-WebAssembly
//! compiler: type discovery and layout (`registry`, `descriptor`), hierarchy-driven v-table and
//! i-table construction (`hierarchy`), synthesis of the runtime dispatch routines (`dispatch`),
//! and bit-exact metadata emission (`metadata`).
//!
//! Class-file parsing, per-method bytecode translation, the constant/string pool manager and
//! module-section ordering are external collaborators (see [`collaborators`]) and out of scope.

pub mod abi;
pub mod block_type;
pub mod collaborators;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod hierarchy;
pub mod metadata;
pub mod registry;
pub mod value_type;

pub use block_type::{BlockType, BlockTypeHandle, BlockTypeTable};
pub use collaborators::{ArrayRepresentation, ClassFileLoader, FunctionManager, MethodFlags, StringPool};
pub use descriptor::{PrimitiveKind, TypeDescriptor, TypeKindData};
pub use dispatch::DispatchSynthesizer;
pub use error::{Result, TypeManagerError};
pub use hierarchy::HierarchyScanner;
pub use metadata::MetadataEmitter;
pub use registry::{ArrayElement, FactorySignature, LambdaBootstrap, TypeRegistry};
pub use value_type::{FieldType, WasmValType};
