//! C4: the [`TypeRegistry`] — the canonical, arena-owned mapping from type key to
//! [`TypeDescriptor`] (§4.1).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use bumpalo::Bump;
use fxhash::FxHashMap;
use nohash_hasher::BuildNoHashHasher;

use crate::block_type::{BlockTypeHandle, BlockTypeTable};
use crate::collaborators::ArrayRepresentation;
use crate::descriptor::{ArrayData, LambdaData, PrimitiveKind, TypeDescriptor, TypeKindData};
use crate::error::{Result, TypeManagerError};
use crate::value_type::{FieldType, WasmValType};

/// The element a new array type is built over.
#[derive(Debug, Copy, Clone)]
pub enum ArrayElement<'l> {
	Primitive(PrimitiveKind),
	Reference(&'l TypeDescriptor<'l>),
}

/// The non-interface-returning half of a `lambdaType` call (§4.1): which concrete method the
/// synthesized wrapper tail-calls into.
#[derive(Debug, Clone)]
pub struct LambdaBootstrap {
	pub impl_owner: String,
	pub impl_name: String,
}

/// The captured-parameter half: everything the factory call site closes over, plus the
/// interface it is supposed to produce (the factory signature's trailing return type, §3.4).
#[derive(Debug, Clone)]
pub struct FactorySignature {
	pub captured_param_types: Vec<FieldType>,
	pub interface_name: String,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ScanPhase {
	Open,
	Finished,
}

/// Owns every [`TypeDescriptor`] created during a compilation. Primitives are materialized
/// eagerly on first use; reference, array and lambda descriptors are created on demand.
/// Mutation is only legal while the registry is in the "open" phase (§3.6); `finish` latches it
/// shut for the rest of the compiler's passes.
pub struct TypeRegistry<'l> {
	bump: &'l Bump,
	array_representation: ArrayRepresentation,
	by_name: std::cell::RefCell<FxHashMap<String, &'l TypeDescriptor<'l>>>,
	/// Keyed by `class_index`. Integers are already well-distributed identifiers assigned in
	/// allocation order, so hashing them further is wasted work — the same rationale the teacher
	/// applies to its own pointer-keyed type pool.
	by_class_index: RefCell<HashMap<i32, &'l TypeDescriptor<'l>, BuildNoHashHasher<i32>>>,
	order: std::cell::RefCell<Vec<&'l TypeDescriptor<'l>>>,
	next_class_index: Cell<i32>,
	phase: Cell<ScanPhase>,
	pub block_types: BlockTypeTable,
}

impl<'l> TypeRegistry<'l> {
	pub fn new(bump: &'l Bump, array_representation: ArrayRepresentation) -> Self {
		Self {
			bump,
			array_representation,
			by_name: Default::default(),
			by_class_index: RefCell::new(HashMap::with_hasher(BuildNoHashHasher::default())),
			order: Default::default(),
			next_class_index: Cell::new(0),
			phase: Cell::new(ScanPhase::Open),
			block_types: BlockTypeTable::new(),
		}
	}

	fn is_finished(&self) -> bool {
		self.phase.get() == ScanPhase::Finished
	}

	/// Latches the registry shut (§3.6's `isFinish`). After this, no descriptor is created, no
	/// field becomes needed, and no v-table entry changes; violating that is a logic error in
	/// the calling compiler, not a recoverable condition (§5).
	pub fn finish(&self) {
		self.phase.set(ScanPhase::Finished);
	}

	pub fn is_finish(&self) -> bool {
		self.is_finished()
	}

	/// Number of registered descriptors, including primitives and `array_native` siblings
	/// (§4.1's `size()`); this is also the length of the emitted type table (§6.2).
	pub fn size(&self) -> usize {
		self.order.borrow().len()
	}

	/// §4.1's `blockType(params, results)`: interns a control-block shape by structural equality,
	/// delegating to the embedded [`BlockTypeTable`] (C8).
	pub fn block_type(&self, params: Vec<WasmValType>, results: Vec<WasmValType>) -> BlockTypeHandle {
		self.block_types.intern(params, results)
	}

	/// Per-kind counts, for logging only (SPEC_FULL §4); never affects emitted bytes.
	pub fn size_breakdown(&self) -> (usize, usize, usize, usize, usize) {
		let order = self.order.borrow();
		let mut counts = (0, 0, 0, 0, 0);
		for descriptor in order.iter() {
			match descriptor.kind {
				TypeKindData::Primitive(_) => counts.0 += 1,
				TypeKindData::Normal => counts.1 += 1,
				TypeKindData::Array(_) => counts.2 += 1,
				TypeKindData::ArrayNative(_) => counts.3 += 1,
				TypeKindData::Lambda(_) => counts.4 += 1,
			}
		}
		counts
	}

	/// Descriptors in creation order — the order the type table (§6.2) and the struct-type
	/// section are emitted in (§5's ordering invariant).
	pub fn descriptors_in_order(&self) -> Vec<&'l TypeDescriptor<'l>> {
		self.order.borrow().clone()
	}

	/// The descriptor created at position `index`, if any. Used by the hierarchy scanner to
	/// walk the registry by an advancing high-water mark rather than a fixed-length snapshot,
	/// since resolving an ancestor class can itself register new descriptors mid-scan.
	pub fn descriptor_at(&self, index: usize) -> Option<&'l TypeDescriptor<'l>> {
		self.order.borrow().get(index).copied()
	}

	/// Lookup by class index, used when walking `instanceOFs` (stored as indices, not handles,
	/// since descriptors spread across an arena cannot cheaply form a reference set). `-1`
	/// (`array_native`) is not unique and is never resolvable through this map.
	pub fn find_by_class_index(&self, class_index: i32) -> Option<&'l TypeDescriptor<'l>> {
		self.by_class_index.borrow().get(&class_index).copied()
	}

	fn ensure_primitives(&self) {
		if !self.order.borrow().is_empty() {
			return;
		}
		for primitive in PrimitiveKind::ALL {
			let descriptor = self.bump.alloc(TypeDescriptor {
				name: primitive.name().to_string(),
				class_index: primitive.class_index(),
				kind: TypeKindData::Primitive(primitive),
				code: Cell::new(None),
				needed_fields: Default::default(),
				fields: Default::default(),
				vtable: Default::default(),
				instance_ofs: Default::default(),
				interface_methods: Default::default(),
				vtable_offset: Cell::new(None),
			});
			self.by_name.borrow_mut().insert(primitive.name().to_string(), descriptor);
			self.by_class_index.borrow_mut().insert(descriptor.class_index, descriptor);
			self.order.borrow_mut().push(descriptor);
		}
		self.next_class_index.set(PrimitiveKind::ALL.len() as i32);
	}

	fn allocate_class_index(&self) -> i32 {
		let idx = self.next_class_index.get();
		self.next_class_index.set(idx + 1);
		idx
	}

	fn register(&self, name: String, descriptor: &'l TypeDescriptor<'l>) {
		self.by_name.borrow_mut().insert(name, descriptor);
		if descriptor.class_index >= 0 {
			self.by_class_index.borrow_mut().insert(descriptor.class_index, descriptor);
		}
		self.order.borrow_mut().push(descriptor);
	}

	/// Returns the descriptor for `name`. A leading `[` parses the array-descriptor chain and
	/// returns the resulting array descriptor; otherwise, on first-ever lookup, the nine
	/// primitives are materialized in canonical order before the requested descriptor is
	/// created (§4.1).
	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
	pub fn value_of(&'l self, name: &str) -> Result<&'l TypeDescriptor<'l>> {
		if let Some(rest) = name.strip_prefix('[') {
			return self.value_of_array_descriptor(rest);
		}

		self.ensure_primitives();

		if let Some(descriptor) = self.by_name.borrow().get(name) {
			return Ok(descriptor);
		}

		if self.is_finished() {
			return Err(TypeManagerError::LateRegistration { what: format!("type `{name}`") });
		}

		let class_index = self.allocate_class_index();
		let descriptor = self.bump.alloc(TypeDescriptor {
			name: name.to_string(),
			class_index,
			kind: TypeKindData::Normal,
			code: Cell::new(None),
			needed_fields: Default::default(),
			fields: Default::default(),
			vtable: Default::default(),
			instance_ofs: Default::default(),
			interface_methods: Default::default(),
			vtable_offset: Cell::new(None),
		});
		self.register(name.to_string(), descriptor);
		Ok(descriptor)
	}

	/// Looks up a primitive by its canonical reflection-style name (`getPrimitiveClass`, §4.1),
	/// linear-searching the fixed-order primitive table.
	pub fn get_primitive_class(&'l self, name: &str) -> Option<&'l TypeDescriptor<'l>> {
		self.ensure_primitives();
		self.by_name.borrow().get(name).copied()
	}

	fn value_of_array_descriptor(&'l self, rest: &str) -> Result<&'l TypeDescriptor<'l>> {
		if let Some(inner) = rest.strip_prefix('[') {
			let element = self.value_of_array_descriptor(inner)?;
			return self.array_type(ArrayElement::Reference(element));
		}
		if let Some(primitive) = rest.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
			let element = self.value_of(primitive)?;
			return self.array_type(ArrayElement::Reference(element));
		}
		let primitive = match rest.chars().next() {
			Some('Z') => PrimitiveKind::Boolean,
			Some('B') => PrimitiveKind::Byte,
			Some('C') => PrimitiveKind::Char,
			Some('D') => PrimitiveKind::Double,
			Some('F') => PrimitiveKind::Float,
			Some('I') => PrimitiveKind::Int,
			Some('J') => PrimitiveKind::Long,
			Some('S') => PrimitiveKind::Short,
			_ => {
				return Err(TypeManagerError::UnsupportedType {
					description: format!("unrecognised array descriptor `[{rest}`"),
				})
			}
		};
		self.array_type(ArrayElement::Primitive(primitive))
	}

	/// Returns or creates an array descriptor over `element` (§4.1). Idempotent: two calls with
	/// an element that resolves to the same name return the same handle.
	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
	pub fn array_type(&'l self, element: ArrayElement<'l>) -> Result<&'l TypeDescriptor<'l>> {
		self.ensure_primitives();

		let (element_name, element_type, component_class_index) = match element {
			ArrayElement::Primitive(p) if p == PrimitiveKind::Void => {
				return Err(TypeManagerError::UnsupportedType {
					description: "array of void is not a valid element kind".to_string(),
				});
			}
			ArrayElement::Primitive(p) => (p.name().to_string(), p.field_type(), p.class_index()),
			ArrayElement::Reference(descriptor) => (
				descriptor.name.clone(),
				FieldType::Value(WasmValType::Ref(descriptor.class_index.max(0) as u32)),
				descriptor.class_index,
			),
		};

		let array_name = format!("[{element_name}");
		if let Some(descriptor) = self.by_name.borrow().get(&array_name) {
			return Ok(descriptor);
		}

		if self.is_finished() {
			return Err(TypeManagerError::LateRegistration { what: format!("array type `{array_name}`") });
		}

		let native_array_type = match self.array_representation {
			ArrayRepresentation::GcArray => {
				let native_name = format!("{array_name}$native");
				let native_index = self.allocate_class_index();
				let native = self.bump.alloc(TypeDescriptor {
					name: native_name.clone(),
					class_index: -1,
					kind: TypeKindData::ArrayNative(element_type),
					code: Cell::new(None),
					needed_fields: Default::default(),
					fields: Default::default(),
					vtable: Default::default(),
					instance_ofs: Default::default(),
					interface_methods: Default::default(),
					vtable_offset: Cell::new(None),
				});
				// array_native descriptors share the -1 index (§3.1) but still need a unique
				// registry slot; record the nominally-allocated index for diagnostics only.
				let _ = native_index;
				self.register(native_name, native);
				Some(&*native)
			}
			ArrayRepresentation::LinearMemory => None,
		};

		let class_index = self.allocate_class_index();
		let descriptor = self.bump.alloc(TypeDescriptor {
			name: array_name.clone(),
			class_index,
			kind: TypeKindData::Array(ArrayData {
				element_type,
				component_class_index,
				native_array_type,
			}),
			code: Cell::new(None),
			needed_fields: Default::default(),
			fields: Default::default(),
			vtable: Default::default(),
			instance_ofs: Default::default(),
			interface_methods: Default::default(),
			vtable_offset: Cell::new(None),
		});
		self.register(array_name, descriptor);
		Ok(descriptor)
	}

	/// Returns or creates the lambda descriptor for this bootstrap/factory-signature pair
	/// (§4.1). Keyed as specified (`"<implOwner>$$<implName>/<abs(hash(implName))>"`); see
	/// DESIGN.md for the accepted collision risk this carries (§9's second open question).
	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self, factory)))]
	pub fn lambda_type(
		&'l self,
		bootstrap: &LambdaBootstrap,
		factory: &FactorySignature,
		interface_method_name: &str,
		line: Option<u32>,
	) -> Result<&'l TypeDescriptor<'l>> {
		self.ensure_primitives();

		let hash = simple_hash(&bootstrap.impl_name).unsigned_abs();
		let key = format!("{}$${}/{}", bootstrap.impl_owner, bootstrap.impl_name, hash);

		if let Some(descriptor) = self.by_name.borrow().get(&key) {
			return Ok(descriptor);
		}

		if self.is_finished() {
			return Err(TypeManagerError::LateRegistration { what: format!("lambda `{key}`") });
		}

		let interface = self.value_of(&factory.interface_name)?;
		let captured_fields = factory
			.captured_param_types
			.iter()
			.enumerate()
			.map(|(i, ty)| (format!("arg${}", i + 1), *ty))
			.collect();

		let class_index = self.allocate_class_index();
		let descriptor = self.bump.alloc(TypeDescriptor {
			name: key.clone(),
			class_index,
			kind: TypeKindData::Lambda(LambdaData {
				captured_fields,
				interface,
				interface_method: interface_method_name.to_string(),
				wrapper_function_name: format!("{key}$wrapper"),
				source_line: line,
			}),
			code: Cell::new(None),
			needed_fields: Default::default(),
			fields: Default::default(),
			vtable: Default::default(),
			instance_ofs: Default::default(),
			interface_methods: Default::default(),
			vtable_offset: Cell::new(None),
		});
		self.register(key, descriptor);
		Ok(descriptor)
	}
}

/// A small, deterministic string hash in the spirit of `java.lang.String.hashCode`, used only
/// to build lambda keys (§4.1, §9). Not cryptographic, not meant to be.
fn simple_hash(s: &str) -> i32 {
	let mut hash: i32 = 0;
	for byte in s.bytes() {
		hash = hash.wrapping_mul(31).wrapping_add(byte as i32);
	}
	hash
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn primitives_materialize_in_canonical_order_with_expected_indices() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let int_class = registry.get_primitive_class("int").unwrap();
		assert_eq!(int_class.class_index, 5);
		assert_eq!(registry.size(), 9);
	}

	#[test]
	fn value_of_is_idempotent() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let a = registry.value_of("a/A").unwrap();
		let b = registry.value_of("a/A").unwrap();
		assert!(std::ptr::eq(a, b));
	}

	#[test]
	fn array_type_of_int_has_expected_component_class_index() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let array = registry.array_type(ArrayElement::Primitive(PrimitiveKind::Int)).unwrap();
		match &array.kind {
			TypeKindData::Array(data) => assert_eq!(data.component_class_index, 5),
			_ => panic!("expected array descriptor"),
		}
		assert!(array.name.starts_with('['));
	}

	#[test]
	fn array_type_is_idempotent() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let a = registry.array_type(ArrayElement::Primitive(PrimitiveKind::Int)).unwrap();
		let b = registry.array_type(ArrayElement::Primitive(PrimitiveKind::Int)).unwrap();
		assert!(std::ptr::eq(a, b));
	}

	#[test]
	fn gc_array_representation_creates_native_sibling() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::GcArray);
		let array = registry.array_type(ArrayElement::Primitive(PrimitiveKind::Int)).unwrap();
		match &array.kind {
			TypeKindData::Array(data) => {
				let native = data.native_array_type.expect("expected native sibling");
				assert_eq!(native.class_index, -1);
			}
			_ => panic!("expected array descriptor"),
		}
	}

	#[test]
	fn registering_after_finish_fails() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		registry.finish();
		let err = registry.value_of("never/Seen").unwrap_err();
		assert!(matches!(err, TypeManagerError::LateRegistration { .. }));
	}

	#[test]
	fn array_of_void_is_unsupported() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let err = registry.array_type(ArrayElement::Primitive(PrimitiveKind::Void)).unwrap_err();
		assert!(matches!(err, TypeManagerError::UnsupportedType { .. }));
	}
}
