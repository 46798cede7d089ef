//! The handful of WebAssembly value shapes a type's instance layout can be built from.
//!
//! Kept deliberately small: this crate only needs enough of the Wasm type vocabulary to
//! describe struct fields, v-table slots and block-type shapes, not a general-purpose Wasm
//! type system. [`FieldType`] maps onto [`wasm_encoder::StorageType`] (struct fields may be
//! packed i8/i16) and [`WasmValType`] maps onto [`wasm_encoder::ValType`] (locals, params,
//! results, block types never pack).

use wasm_encoder::{StorageType, ValType};

/// A value type as it appears in a function signature, local, or block-type parameter/result
/// list. Never packed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum WasmValType {
	I32,
	I64,
	F32,
	F64,
	/// An opaque reference to one of this crate's own struct types, by class index. Used for
	/// GC-represented instances; under [`ArrayRepresentation::LinearMemory`](crate::collaborators::ArrayRepresentation::LinearMemory)
	/// this never appears and references are represented as [`WasmValType::I32`] offsets instead.
	Ref(u32),
}

impl From<WasmValType> for ValType {
	fn from(value: WasmValType) -> Self {
		match value {
			WasmValType::I32 => ValType::I32,
			WasmValType::I64 => ValType::I64,
			WasmValType::F32 => ValType::F32,
			WasmValType::F64 => ValType::F64,
			// A concrete, non-nullable reference to struct type `idx`. The module writer (out of
			// scope here) is responsible for turning class indices into the struct-type indices
			// this crate assigns via `TypeDescriptor::code`.
			WasmValType::Ref(idx) => ValType::Ref(wasm_encoder::RefType {
				nullable: true,
				heap_type: wasm_encoder::HeapType::Concrete(idx),
			}),
		}
	}
}

/// A value type as it can appear inside a struct's field list. Struct fields may additionally
/// be packed to a single byte or two bytes (`byte`/`char`/`short`-sized CFBC fields), which
/// [`WasmValType`] cannot express.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FieldType {
	Packed8,
	Packed16,
	Value(WasmValType),
}

impl FieldType {
	/// The single byte written into the field-descriptor list of the metadata blob (§6.1). An
	/// arbitrary but stable code: `0`=i32 `1`=i64 `2`=f32 `3`=f64 `4`=ref `5`=packed8 `6`=packed16.
	pub fn wasm_type_code(self) -> u8 {
		match self {
			FieldType::Value(WasmValType::I32) => 0,
			FieldType::Value(WasmValType::I64) => 1,
			FieldType::Value(WasmValType::F32) => 2,
			FieldType::Value(WasmValType::F64) => 3,
			FieldType::Value(WasmValType::Ref(_)) => 4,
			FieldType::Packed8 => 5,
			FieldType::Packed16 => 6,
		}
	}
}

impl From<FieldType> for StorageType {
	fn from(value: FieldType) -> Self {
		match value {
			FieldType::Packed8 => StorageType::I8,
			FieldType::Packed16 => StorageType::I16,
			FieldType::Value(v) => StorageType::Val(v.into()),
		}
	}
}
