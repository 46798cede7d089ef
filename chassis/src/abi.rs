//! The fixed byte offsets of the per-type metadata blob (§6.1). These are the ABI: the
//! [`DispatchSynthesizer`](crate::dispatch) hard-references them in emitted WebAssembly, and the
//! [`MetadataEmitter`](crate::metadata) writes the blob in exactly this shape. Never renumber.

pub const INTERFACE_OFFSET: u32 = 0;
pub const INSTANCEOF_OFFSET: u32 = 4;
pub const TYPE_NAME_OFFSET: u32 = 8;
pub const ARRAY_TYPE_OFFSET: u32 = 12;
pub const FIELDS_OFFSET_OFFSET: u32 = 16;
pub const FIRST_VTABLE_BYTE_OFFSET: u32 = 20;
/// `= FIRST_VTABLE_BYTE_OFFSET / 4`; the first valid virtual-method index.
pub const FIRST_VTABLE_INDEX: u32 = 5;
