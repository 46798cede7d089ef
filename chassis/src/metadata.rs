//! C7: the [`MetadataEmitter`] — serializes every descriptor to the bit-exact per-type blob
//! (§6.1), then the flat type table (§6.2). Byte widths and offsets here ARE the ABI; changing
//! one without updating [`crate::dispatch`] and [`crate::abi`] in lock-step breaks every
//! translated call site.

use crate::abi::{ARRAY_TYPE_OFFSET, FIELDS_OFFSET_OFFSET, INSTANCEOF_OFFSET, INTERFACE_OFFSET, TYPE_NAME_OFFSET};
use crate::collaborators::{FunctionManager, StringPool};
use crate::descriptor::TypeDescriptor;
use crate::error::Result;
use crate::registry::TypeRegistry;

const HEADER_LEN: u32 = 20;

pub struct MetadataEmitter<'a> {
	string_pool: &'a dyn StringPool,
	functions: &'a dyn FunctionManager,
}

impl<'a> MetadataEmitter<'a> {
	pub fn new(string_pool: &'a dyn StringPool, functions: &'a dyn FunctionManager) -> Self {
		Self { string_pool, functions }
	}

	/// Latches the registry, writes every descriptor's metadata blob (in registry order) into a
	/// single linear-memory image, then appends the type table (§4.4). Also registers the
	/// `typeTableMemoryOffset` and `classConstant` accessors (§4.4, §6.2, §6.3) so translated
	/// code can locate the table and turn a class index into a `Class` reference.
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn prepare_finish<'l>(&self, registry: &TypeRegistry<'l>) -> Result<Vec<u8>> {
		registry.finish();

		let descriptors = registry.descriptors_in_order();
		let mut image = Vec::new();
		for descriptor in &descriptors {
			let offset = image.len() as u32;
			descriptor.vtable_offset.set(Some(offset));
			self.write_blob(descriptor, &mut image);
		}

		let table_base = image.len() as u32;
		for descriptor in &descriptors {
			let offset = descriptor.vtable_offset.get().expect("vtable_offset set during blob emission above");
			image.extend_from_slice(&offset.to_le_bytes());
		}

		let table_offset_wat = format!(
			r#"(module (func $typeTableMemoryOffset (export "typeTableMemoryOffset") (result i32) (i32.const {table_base})))"#
		);
		self.functions.register_synthetic(
			"java/lang/Class.typeTableMemoryOffset()I",
			crate::dispatch::compile_function_body(&table_offset_wat),
		);

		// classConstant(classIndex) reads the type table entry for classIndex and returns it as
		// the Class reference — under this ABI's linear-memory representation a Class reference
		// *is* the byte offset of its metadata blob, the same vtableOffset stored in the table.
		let class_constant_wat = format!(
			r#"(module
  (func $classConstant (export "classConstant") (param $classIndex i32) (result i32)
    (i32.load
      (i32.add
        (i32.const {table_base})
        (i32.mul (local.get $classIndex) (i32.const 4))))))"#
		);
		self.functions.register_synthetic(
			"java/lang/Class.classConstant(I)Ljava/lang/Class;",
			crate::dispatch::compile_function_body(&class_constant_wat),
		);

		Ok(image)
	}

	fn write_blob(&self, descriptor: &TypeDescriptor, image: &mut Vec<u8>) {
		let vtable = descriptor.vtable.borrow();
		let mut vtable_bytes = Vec::with_capacity(vtable.len() * 4);
		for slot in vtable.iter() {
			let function_index = self
				.functions
				.function_index(&slot.function_name)
				.expect("vtable function index assigned before metadata emission");
			vtable_bytes.extend_from_slice(&function_index.to_le_bytes());
		}
		drop(vtable);

		let interface_methods = descriptor.interface_methods.borrow();
		let mut itable_bytes = Vec::new();
		for (interface_class_index, methods) in interface_methods.iter() {
			itable_bytes.extend_from_slice(&interface_class_index.to_le_bytes());
			let next_block_offset = 4 * (2 + methods.len() as u32);
			itable_bytes.extend_from_slice(&next_block_offset.to_le_bytes());
			for function_name in methods {
				let function_index = self
					.functions
					.function_index(function_name)
					.expect("itable function index assigned before metadata emission");
				itable_bytes.extend_from_slice(&function_index.to_le_bytes());
			}
		}
		itable_bytes.extend_from_slice(&0u32.to_le_bytes());
		drop(interface_methods);

		let instance_ofs = descriptor.instance_ofs.borrow();
		let mut instanceof_bytes = Vec::with_capacity(4 + instance_ofs.len() * 4);
		instanceof_bytes.extend_from_slice(&(instance_ofs.len() as u32).to_le_bytes());
		for class_index in instance_ofs.iter() {
			instanceof_bytes.extend_from_slice(&class_index.to_le_bytes());
		}
		drop(instance_ofs);

		let mut field_bytes = Vec::new();
		if descriptor.is_normal() {
			for field in descriptor.fields.borrow().iter() {
				let name_id = self.string_pool.intern(&field.name);
				field_bytes.extend_from_slice(&name_id.to_le_bytes());
				field_bytes.push(field.ty.wasm_type_code());
			}
		}

		let interface_offset = HEADER_LEN + vtable_bytes.len() as u32;
		let instanceof_offset = interface_offset + itable_bytes.len() as u32;
		let fields_offset = instanceof_offset + instanceof_bytes.len() as u32;

		let dotted_name = descriptor.name.replace('/', ".");
		let type_name_id = self.string_pool.intern(&dotted_name);
		let array_type = match &descriptor.kind {
			crate::descriptor::TypeKindData::Array(data) => data.component_class_index,
			_ => -1,
		};

		debug_assert_eq!(INTERFACE_OFFSET, 0);
		debug_assert_eq!(INSTANCEOF_OFFSET, 4);
		debug_assert_eq!(TYPE_NAME_OFFSET, 8);
		debug_assert_eq!(ARRAY_TYPE_OFFSET, 12);
		debug_assert_eq!(FIELDS_OFFSET_OFFSET, 16);

		image.extend_from_slice(&interface_offset.to_le_bytes());
		image.extend_from_slice(&instanceof_offset.to_le_bytes());
		image.extend_from_slice(&type_name_id.to_le_bytes());
		image.extend_from_slice(&array_type.to_le_bytes());
		image.extend_from_slice(&fields_offset.to_le_bytes());
		image.extend_from_slice(&vtable_bytes);
		image.extend_from_slice(&itable_bytes);
		image.extend_from_slice(&instanceof_bytes);
		image.extend_from_slice(&field_bytes);
	}
}

fn read_u32_le(image: &[u8], offset: usize) -> u32 {
	u32::from_le_bytes(image[offset..offset + 4].try_into().unwrap())
}

fn read_i32_le(image: &[u8], offset: usize) -> i32 {
	i32::from_le_bytes(image[offset..offset + 4].try_into().unwrap())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::collaborators::{ArrayRepresentation, ClassFile, FieldInfo, MemoryClassFileLoader, MemoryFunctionManager};
	use crate::collaborators::InterningStringPool;
	use crate::hierarchy::HierarchyScanner;
	use crate::value_type::{FieldType, WasmValType};
	use bumpalo::Bump;

	fn object_class() -> ClassFile {
		ClassFile {
			name: "java/lang/Object".to_string(),
			super_class: None,
			interfaces: vec![],
			fields: vec![],
			methods: vec![],
			is_interface: false,
			is_abstract: false,
		}
	}

	#[test]
	fn scalar_field_layout_blob_matches_expected_shape() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let loader = MemoryClassFileLoader::new().with_class(object_class()).with_class(ClassFile {
			name: "a/A".to_string(),
			super_class: Some("java/lang/Object".to_string()),
			interfaces: vec![],
			fields: vec![FieldInfo { name: "x".to_string(), ty: FieldType::Value(WasmValType::I32), is_static: false }],
			methods: vec![],
			is_interface: false,
			is_abstract: false,
		});
		let functions = MemoryFunctionManager::new();
		let strings = InterningStringPool::new();

		let descriptor = registry.value_of("a/A").unwrap();
		descriptor.mark_field_needed("x");

		let scanner = HierarchyScanner::new(&registry, &loader, &functions);
		scanner.scan_type_hierarchy().unwrap();

		let emitter = MetadataEmitter::new(&strings, &functions);
		let image = emitter.prepare_finish(&registry).unwrap();

		let offset = descriptor.vtable_offset.get().unwrap() as usize;
		let interface_offset = read_u32_le(&image, offset);
		let instanceof_offset = read_u32_le(&image, offset + 4);
		let array_type = read_i32_le(&image, offset + 12);
		let fields_offset = read_u32_le(&image, offset + 16);

		assert_eq!(array_type, -1);
		assert_eq!(interface_offset, 20);
		// no v-table entries and no interface blocks: just the 4-byte terminator.
		assert_eq!(instanceof_offset, interface_offset + 4);

		let field_region = &image[offset + fields_offset as usize..];
		let name_id = read_u32_le(field_region, 0);
		let type_code = field_region[4];
		assert_eq!(strings.resolve(name_id).as_deref(), Some("x"));
		assert_eq!(type_code, FieldType::Value(WasmValType::I32).wasm_type_code());
	}

	#[test]
	fn type_name_round_trips_through_string_pool() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let loader = MemoryClassFileLoader::new().with_class(object_class()).with_class(ClassFile {
			name: "a/b/C".to_string(),
			super_class: Some("java/lang/Object".to_string()),
			interfaces: vec![],
			fields: vec![],
			methods: vec![],
			is_interface: false,
			is_abstract: false,
		});
		let functions = MemoryFunctionManager::new();
		let strings = InterningStringPool::new();

		let descriptor = registry.value_of("a/b/C").unwrap();
		let scanner = HierarchyScanner::new(&registry, &loader, &functions);
		scanner.scan_type_hierarchy().unwrap();

		let emitter = MetadataEmitter::new(&strings, &functions);
		let image = emitter.prepare_finish(&registry).unwrap();

		let offset = descriptor.vtable_offset.get().unwrap() as usize;
		let type_name_id = read_u32_le(&image, offset + 8);
		assert_eq!(strings.resolve(type_name_id).as_deref(), Some("a.b.C"));
	}

	#[test]
	fn type_table_entries_equal_vtable_offsets_in_registry_order() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let loader = MemoryClassFileLoader::new().with_class(object_class()).with_class(ClassFile {
			name: "a/A".to_string(),
			super_class: Some("java/lang/Object".to_string()),
			interfaces: vec![],
			fields: vec![],
			methods: vec![],
			is_interface: false,
			is_abstract: false,
		});
		let functions = MemoryFunctionManager::new();
		let strings = InterningStringPool::new();

		registry.value_of("a/A").unwrap();
		let scanner = HierarchyScanner::new(&registry, &loader, &functions);
		scanner.scan_type_hierarchy().unwrap();

		let emitter = MetadataEmitter::new(&strings, &functions);
		let image = emitter.prepare_finish(&registry).unwrap();

		let table_base = image.len() - registry.size() * 4;
		for (i, descriptor) in registry.descriptors_in_order().iter().enumerate() {
			let entry = read_u32_le(&image, table_base + i * 4);
			assert_eq!(entry, descriptor.vtable_offset.get().unwrap());
		}
	}

	#[test]
	fn type_table_and_class_constant_accessors_are_both_registered() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let loader = MemoryClassFileLoader::new().with_class(object_class());
		let functions = MemoryFunctionManager::new();
		let strings = InterningStringPool::new();

		let scanner = HierarchyScanner::new(&registry, &loader, &functions);
		scanner.scan_type_hierarchy().unwrap();

		let emitter = MetadataEmitter::new(&strings, &functions);
		emitter.prepare_finish(&registry).unwrap();

		let table_offset_index = functions.function_index("java/lang/Class.typeTableMemoryOffset()I");
		let class_constant_index = functions.function_index("java/lang/Class.classConstant(I)Ljava/lang/Class;");
		assert!(table_offset_index.is_some());
		assert!(class_constant_index.is_some());
		assert_ne!(table_offset_index, class_constant_index);
	}
}
