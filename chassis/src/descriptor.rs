//! [`TypeDescriptor`] and its kind-specific auxiliary data (§3.1–§3.4, §9's tagged-variant
//! note). The registry (§4.1) owns every descriptor for the lifetime of a compilation; nothing
//! outside this crate ever gets a mutable reference to one, only a shared `&'l TypeDescriptor`
//! handle, matching §3.7's ownership rule.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt::{Debug, Display, Formatter};

use chassis_derive::FromRepr;

use crate::value_type::FieldType;

/// The nine primitive kinds, in the fixed order that assigns class indices 0..8 (§3.2). This
/// order is load-bearing: do not reorder the variants.
#[repr(u8)]
#[derive(FromRepr, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PrimitiveKind {
	Boolean = 0,
	Byte = 1,
	Char = 2,
	Double = 3,
	Float = 4,
	Int = 5,
	Long = 6,
	Short = 7,
	Void = 8,
}

impl PrimitiveKind {
	/// All nine, in canonical order. Used by the registry to eagerly materialize the
	/// primitive table on first use and by `getPrimitiveClass`-style name lookups.
	pub const ALL: [PrimitiveKind; 9] = [
		PrimitiveKind::Boolean,
		PrimitiveKind::Byte,
		PrimitiveKind::Char,
		PrimitiveKind::Double,
		PrimitiveKind::Float,
		PrimitiveKind::Int,
		PrimitiveKind::Long,
		PrimitiveKind::Short,
		PrimitiveKind::Void,
	];

	pub fn name(self) -> &'static str {
		match self {
			PrimitiveKind::Boolean => "boolean",
			PrimitiveKind::Byte => "byte",
			PrimitiveKind::Char => "char",
			PrimitiveKind::Double => "double",
			PrimitiveKind::Float => "float",
			PrimitiveKind::Int => "int",
			PrimitiveKind::Long => "long",
			PrimitiveKind::Short => "short",
			PrimitiveKind::Void => "void",
		}
	}

	pub fn by_name(name: &str) -> Option<PrimitiveKind> {
		Self::ALL.into_iter().find(|p| p.name() == name)
	}

	pub fn class_index(self) -> i32 {
		self as i32
	}

	/// The value type a field of this primitive kind occupies in a struct layout.
	pub fn field_type(self) -> FieldType {
		use crate::value_type::WasmValType::*;
		match self {
			PrimitiveKind::Boolean | PrimitiveKind::Byte => FieldType::Packed8,
			PrimitiveKind::Char | PrimitiveKind::Short => FieldType::Packed16,
			PrimitiveKind::Double => FieldType::Value(F64),
			PrimitiveKind::Float => FieldType::Value(F32),
			PrimitiveKind::Int => FieldType::Value(I32),
			PrimitiveKind::Long => FieldType::Value(I64),
			PrimitiveKind::Void => FieldType::Value(I32),
		}
	}
}

/// One entry of the ordered field-layout list (§3.1's `fields`): the declaring class, the
/// field's own name, and its value type. Order here is layout order and is never resorted.
#[derive(Debug, Clone)]
pub struct FieldLayout {
	pub declaring_class: String,
	pub name: String,
	pub ty: FieldType,
}

/// One v-table slot: the (name, descriptor) pair identifies *which* method this slot answers
/// for (used by `addOrUpdateVTable`'s matching rule, §4.2.2), `function_name` is the concrete
/// implementation currently installed.
#[derive(Debug, Clone)]
pub struct VTableSlot {
	pub method_name: String,
	pub method_descriptor: String,
	pub function_name: String,
	/// True when `function_name` was installed as a direct interface's default method rather
	/// than a class's own concrete override. Tracked on the slot itself (not derived from
	/// i-table assignment, which happens later, after the whole class is folded in) so that
	/// two interfaces defaulting the same method on one class resolve first-discovered-wins
	/// (§4.2.2, §9).
	pub is_default: bool,
}

/// Kind-specific auxiliary data a [`TypeDescriptor`] carries. A tagged-variant record rather
/// than a subclass hierarchy, per §9's design note.
pub enum TypeKindData<'l> {
	Primitive(PrimitiveKind),
	Normal,
	Array(ArrayData<'l>),
	ArrayNative(FieldType),
	Lambda(LambdaData<'l>),
}

impl Debug for TypeKindData<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			TypeKindData::Primitive(p) => write!(f, "Primitive({p:?})"),
			TypeKindData::Normal => write!(f, "Normal"),
			TypeKindData::Array(_) => write!(f, "Array"),
			TypeKindData::ArrayNative(t) => write!(f, "ArrayNative({t:?})"),
			TypeKindData::Lambda(_) => write!(f, "Lambda"),
		}
	}
}

#[derive(Debug)]
pub struct ArrayData<'l> {
	pub element_type: FieldType,
	pub component_class_index: i32,
	/// Present only under `ArrayRepresentation::GcArray` (§3.3).
	pub native_array_type: Option<&'l TypeDescriptor<'l>>,
}

pub struct LambdaData<'l> {
	pub captured_fields: Vec<(String, FieldType)>,
	pub interface: &'l TypeDescriptor<'l>,
	pub interface_method: String,
	pub wrapper_function_name: String,
	/// Supplemental diagnostic field (SPEC_FULL §3): the source line of the factory call
	/// site, for error messages only.
	pub source_line: Option<u32>,
}

impl Debug for LambdaData<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LambdaData")
			.field("interface", &self.interface.name)
			.field("interface_method", &self.interface_method)
			.field("wrapper_function_name", &self.wrapper_function_name)
			.finish()
	}
}

/// A single reference, array, lambda or primitive type as tracked by the type manager
/// (§3.1). Allocated once by the registry's arena and never moved or freed for the lifetime of
/// a compilation; all mutation after creation goes through `&self` + interior mutability, as
/// required by the "external callers never mutate layout fields directly" rule of §3.7.
pub struct TypeDescriptor<'l> {
	pub name: String,
	/// Unique per descriptor except `array_native`, which is always `-1` (§3.1).
	pub class_index: i32,
	pub kind: TypeKindData<'l>,
	/// The Wasm struct-type index, assigned by the module writer at emission time (§3.1);
	/// absent until then.
	pub code: Cell<Option<u32>>,
	/// Field names referenced by any compiled method on this type. The only attribute mutable
	/// by external callers, and only before the scan-finish latch (§3.7).
	pub needed_fields: RefCell<HashSet<String>>,
	/// Populated by the hierarchy scanner (§4.2).
	pub fields: RefCell<Vec<FieldLayout>>,
	/// Slot *i* is the concrete function to invoke for virtual-method-index `i + 5`.
	pub vtable: RefCell<Vec<VTableSlot>>,
	/// Most-derived-first order of discovery; self, all superclasses, all transitively
	/// implemented interfaces (§3.1). Stored as class indices, since descriptors across an
	/// arena cannot cheaply form a `HashSet` of references.
	pub instance_ofs: RefCell<Vec<i32>>,
	/// Interface-encounter order; (interface class index, ordered concrete function names in
	/// i-table-index order).
	pub interface_methods: RefCell<Vec<(i32, Vec<String>)>>,
	/// Byte offset of this descriptor's metadata blob in the data image; set exactly once,
	/// only during emission (§3.1, §4.4).
	pub vtable_offset: Cell<Option<u32>>,
}

impl Debug for TypeDescriptor<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TypeDescriptor")
			.field("name", &self.name)
			.field("class_index", &self.class_index)
			.field("kind", &self.kind)
			.field("fields", &self.fields.borrow().len())
			.field("vtable", &self.vtable.borrow().len())
			.finish()
	}
}

impl Display for TypeDescriptor<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name)
	}
}

impl Eq for TypeDescriptor<'_> {}

impl PartialEq for TypeDescriptor<'_> {
	fn eq(&self, other: &Self) -> bool {
		std::ptr::eq(self, other)
	}
}

impl std::hash::Hash for TypeDescriptor<'_> {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		(self as *const Self).hash(state)
	}
}

impl<'l> TypeDescriptor<'l> {
	pub fn is_primitive(&self) -> bool {
		matches!(self.kind, TypeKindData::Primitive(_))
	}

	pub fn is_array(&self) -> bool {
		matches!(self.kind, TypeKindData::Array(_))
	}

	pub fn is_array_native(&self) -> bool {
		matches!(self.kind, TypeKindData::ArrayNative(_))
	}

	pub fn is_lambda(&self) -> bool {
		matches!(self.kind, TypeKindData::Lambda(_))
	}

	pub fn is_normal(&self) -> bool {
		matches!(self.kind, TypeKindData::Normal)
	}

	/// Marks `field` as referenced by some compiled method on this type. External callers may
	/// only do this before the registry's scan-finish latch; enforced by the registry, not here.
	pub fn mark_field_needed(&self, field: &str) {
		self.needed_fields.borrow_mut().insert(field.to_string());
	}

	/// True once `instance_ofs` records `class_index` as an ancestor (self, superclass, or
	/// transitively implemented interface) — the basis for both `instanceof` emission and the
	/// testable property in spec §8.
	pub fn is_instance_of(&self, class_index: i32) -> bool {
		self.instance_ofs.borrow().iter().any(|i| *i == class_index)
	}
}
