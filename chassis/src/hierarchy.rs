//! C5: the [`HierarchyScanner`] — walks the class hierarchy to populate every descriptor's
//! instance layout, v-table, i-table and `instanceof` set (§4.2).

use std::collections::{HashSet, VecDeque};

use crate::collaborators::{ClassFile, ClassFileLoader, FunctionManager, MethodInfo};
use crate::descriptor::{FieldLayout, TypeDescriptor, TypeKindData, VTableSlot};
use crate::error::{Result, TypeManagerError};
use crate::registry::TypeRegistry;
use crate::value_type::{FieldType, WasmValType};

fn object_header_fields(declaring_class: &str) -> Vec<FieldLayout> {
	vec![
		FieldLayout {
			declaring_class: declaring_class.to_string(),
			name: ".vtable".to_string(),
			ty: FieldType::Value(WasmValType::I32),
		},
		FieldLayout {
			declaring_class: declaring_class.to_string(),
			name: ".hashcode".to_string(),
			ty: FieldType::Value(WasmValType::I32),
		},
	]
}

/// Walks every descriptor in the registry, in creation order, and fills in its layout. New
/// descriptors discovered while resolving an ancestor (a superclass or interface nobody had
/// referenced directly yet) are picked up because the scan advances a high-water-mark index
/// against the live registry rather than against a fixed-length snapshot (§4.2, SPEC_FULL §4).
pub struct HierarchyScanner<'l, 'a> {
	registry: &'l TypeRegistry<'l>,
	loader: &'a dyn ClassFileLoader,
	functions: &'a dyn FunctionManager,
}

impl<'l, 'a> HierarchyScanner<'l, 'a> {
	pub fn new(
		registry: &'l TypeRegistry<'l>,
		loader: &'a dyn ClassFileLoader,
		functions: &'a dyn FunctionManager,
	) -> Self {
		Self { registry, loader, functions }
	}

	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
	pub fn scan_type_hierarchy(&self) -> Result<()> {
		let mut index = 0;
		while index < self.registry.size() {
			let descriptor = self.registry.descriptor_at(index).expect("index within registry bounds");
			self.scan_descriptor(descriptor)?;
			index += 1;
		}
		Ok(())
	}

	fn scan_descriptor(&self, descriptor: &'l TypeDescriptor<'l>) -> Result<()> {
		match &descriptor.kind {
			TypeKindData::Primitive(_) => Ok(()),
			TypeKindData::Array(data) => {
				let mut fields = object_header_fields(&descriptor.name);
				let storage_type = match data.native_array_type {
					Some(native) => FieldType::Value(WasmValType::Ref(native.class_index.max(0) as u32)),
					None => data.element_type,
				};
				fields.push(FieldLayout {
					declaring_class: descriptor.name.clone(),
					name: "storage".to_string(),
					ty: storage_type,
				});
				*descriptor.fields.borrow_mut() = fields;
				Ok(())
			}
			TypeKindData::ArrayNative(element_type) => {
				*descriptor.fields.borrow_mut() = vec![FieldLayout {
					declaring_class: descriptor.name.clone(),
					name: "element".to_string(),
					ty: *element_type,
				}];
				Ok(())
			}
			TypeKindData::Lambda(data) => {
				let mut fields = object_header_fields(&descriptor.name);
				for (name, ty) in &data.captured_fields {
					fields.push(FieldLayout { declaring_class: descriptor.name.clone(), name: name.clone(), ty: *ty });
				}
				*descriptor.fields.borrow_mut() = fields;
				descriptor
					.interface_methods
					.borrow_mut()
					.push((data.interface.class_index, vec![data.wrapper_function_name.clone()]));
				self.functions.mark_used(&data.wrapper_function_name);
				self.functions.set_itable_index(&data.wrapper_function_name, 2);
				Ok(())
			}
			TypeKindData::Normal => self.scan_normal(descriptor),
		}
	}

	fn scan_normal(&self, descriptor: &'l TypeDescriptor<'l>) -> Result<()> {
		let root_class = self.loader.load(&descriptor.name)?;

		self.walk_a_interfaces(descriptor, &root_class)?;

		let mut aggregate_needed = HashSet::new();
		let mut fields = Vec::new();
		self.walk_b(descriptor, &descriptor.name, &mut aggregate_needed, &mut fields)?;
		*descriptor.fields.borrow_mut() = fields;

		if !root_class.is_abstract {
			self.build_itables(descriptor)?;
		}
		Ok(())
	}

	/// Walk A (§4.2.1): enumerate every interface reachable from the superclass chain, direct
	/// interfaces across the whole chain first, their super-interfaces in a second, breadth-first
	/// pass. A visited set prevents an interface reachable via two paths from being recorded twice.
	fn walk_a_interfaces(&self, descriptor: &'l TypeDescriptor<'l>, root_class: &ClassFile) -> Result<()> {
		let mut visited: HashSet<String> = HashSet::new();
		let mut queue: VecDeque<String> = VecDeque::new();

		let mut chain = vec![root_class.clone()];
		let mut current = root_class.clone();
		while let Some(super_name) = current.super_class.clone() {
			let super_class = self.loader.load(&super_name)?;
			chain.push(super_class.clone());
			current = super_class;
		}

		for class_file in &chain {
			for interface_name in &class_file.interfaces {
				if visited.insert(interface_name.clone()) {
					let interface_descriptor = self.registry.value_of(interface_name)?;
					descriptor.instance_ofs.borrow_mut().push(interface_descriptor.class_index);
					queue.push_back(interface_name.clone());
				}
			}
		}

		while let Some(interface_name) = queue.pop_front() {
			let interface_file = self.loader.load(&interface_name)?;
			for super_interface in &interface_file.interfaces {
				if visited.insert(super_interface.clone()) {
					let interface_descriptor = self.registry.value_of(super_interface)?;
					descriptor.instance_ofs.borrow_mut().push(interface_descriptor.class_index);
					queue.push_back(super_interface.clone());
				}
			}
		}

		Ok(())
	}

	/// Walk B (§4.2.1): recurse to the superclass first, then on the way back down append this
	/// class's own needed fields, update the v-table with its own methods, then fold in default
	/// methods from its direct interfaces. `aggregate_needed` is therefore complete (the union
	/// over the whole chain) by the time any field list is actually filtered.
	fn walk_b(
		&self,
		descriptor: &'l TypeDescriptor<'l>,
		class_name: &str,
		aggregate_needed: &mut HashSet<String>,
		fields: &mut Vec<FieldLayout>,
	) -> Result<()> {
		let class_file = self.loader.load(class_name)?;

		if class_file.is_interface {
			fields.extend(object_header_fields(class_name));
			return Ok(());
		}

		let class_descriptor = self.registry.value_of(class_name)?;
		aggregate_needed.extend(class_descriptor.needed_fields.borrow().iter().cloned());
		descriptor.instance_ofs.borrow_mut().push(class_descriptor.class_index);

		match &class_file.super_class {
			Some(super_name) => self.walk_b(descriptor, super_name, aggregate_needed, fields)?,
			None => fields.extend(object_header_fields(class_name)),
		}

		for field in class_file.fields.iter().filter(|f| !f.is_static) {
			if aggregate_needed.contains(&field.name) {
				fields.push(FieldLayout {
					declaring_class: class_name.to_string(),
					name: field.name.clone(),
					ty: field.ty,
				});
			}
		}

		for method in class_file.methods.iter().filter(|m| !m.is_static() && !m.is_constructor()) {
			let function_name = method.qualified_name(class_name);
			self.add_or_update_vtable(descriptor, &function_name, &method.name, &method.descriptor, false)?;
		}

		for interface_name in &class_file.interfaces {
			let interface_file = self.loader.load(interface_name)?;
			for method in &interface_file.methods {
				let function_name = method.qualified_name(interface_name);
				if self.functions.is_used(&function_name) {
					self.add_or_update_vtable(descriptor, &function_name, &method.name, &method.descriptor, true)?;
				}
			}
		}

		Ok(())
	}

	/// §4.2.2. `is_default` is true when `func` comes from a direct interface's default method
	/// rather than a concretely declared method of the class being folded in.
	fn add_or_update_vtable(
		&self,
		descriptor: &'l TypeDescriptor<'l>,
		function_name: &str,
		method_name: &str,
		method_descriptor: &str,
		is_default: bool,
	) -> Result<()> {
		let mut vtable = descriptor.vtable.borrow_mut();
		let existing = vtable
			.iter()
			.position(|slot| slot.method_name == method_name && slot.method_descriptor == method_descriptor);

		match existing {
			Some(index) => {
				// A default can't bump an already-default slot (first-discovered-wins, §9);
				// a concrete override always wins regardless of what currently occupies it.
				let already_default = vtable[index].is_default;
				if !is_default || !already_default {
					vtable[index].function_name = function_name.to_string();
					vtable[index].is_default = is_default;
					self.functions.set_vtable_index(function_name, (index + 5) as u32);
				}
				self.functions.mark_used(function_name);
			}
			None => {
				if self.functions.is_used(function_name) {
					let index = vtable.len();
					vtable.push(VTableSlot {
						method_name: method_name.to_string(),
						method_descriptor: method_descriptor.to_string(),
						function_name: function_name.to_string(),
						is_default,
					});
					self.functions.mark_used(function_name);
					self.functions.set_vtable_index(function_name, (index + 5) as u32);
				}
			}
		}
		Ok(())
	}

	/// Post-walk-B i-table construction (§4.2.1, final paragraph), skipped entirely for abstract
	/// classes since they have no instances and thus no dispatch table.
	fn build_itables(&self, descriptor: &'l TypeDescriptor<'l>) -> Result<()> {
		let instance_ofs = descriptor.instance_ofs.borrow().clone();
		for class_index in instance_ofs {
			let Some(interface_descriptor) = self.registry.find_by_class_index(class_index) else {
				continue;
			};
			if !matches!(interface_descriptor.kind, TypeKindData::Normal) {
				continue;
			}
			let interface_file = self.loader.load(&interface_descriptor.name)?;
			if !interface_file.is_interface {
				continue;
			}

			let mut realized = Vec::new();
			for method in &interface_file.methods {
				let qualified = method.qualified_name(&interface_descriptor.name);
				if !self.functions.is_used(&qualified) {
					continue;
				}
				let function_name = self.resolve_interface_method(descriptor, &interface_descriptor.name, method)?;
				// Two-word block header (class index, next-block offset) precedes the
				// per-class i-table slots (§6.1), so the first method lands at index 2.
				let index = realized.len() as u32 + 2;
				self.functions.mark_used(&function_name);
				self.functions.set_itable_index(&function_name, index);
				realized.push(function_name);
			}
			if !realized.is_empty() {
				descriptor.interface_methods.borrow_mut().push((class_index, realized));
			}
		}
		Ok(())
	}

	/// Searches the class chain's v-table first (which already folds in direct-interface
	/// defaults, §4.2.1 step 6), then falls back to any other transitively implemented
	/// interface's default method.
	fn resolve_interface_method(
		&self,
		descriptor: &'l TypeDescriptor<'l>,
		interface_name: &str,
		method: &MethodInfo,
	) -> Result<String> {
		if let Some(slot) = descriptor
			.vtable
			.borrow()
			.iter()
			.find(|slot| slot.method_name == method.name && slot.method_descriptor == method.descriptor)
		{
			return Ok(slot.function_name.clone());
		}

		for class_index in descriptor.instance_ofs.borrow().iter() {
			let Some(candidate) = self.registry.find_by_class_index(*class_index) else { continue };
			if candidate.name == interface_name {
				continue;
			}
			let candidate_file = self.loader.load(&candidate.name)?;
			if !candidate_file.is_interface {
				continue;
			}
			if let Some(default_method) = candidate_file
				.methods
				.iter()
				.find(|m| m.name == method.name && m.descriptor == method.descriptor && m.has_body())
			{
				return Ok(default_method.qualified_name(&candidate.name));
			}
		}

		Err(TypeManagerError::MissingImplementation {
			class: descriptor.name.clone(),
			interface: interface_name.to_string(),
			method: format!("{}{}", method.name, method.descriptor),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::collaborators::{ClassFile, FieldInfo, MemoryClassFileLoader, MemoryFunctionManager, MethodFlags, MethodInfo};
	use crate::collaborators::ArrayRepresentation;
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
	fn scalar_field_layout() {
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

		let descriptor = registry.value_of("a/A").unwrap();
		descriptor.mark_field_needed("x");

		let scanner = HierarchyScanner::new(&registry, &loader, &functions);
		scanner.scan_type_hierarchy().unwrap();

		let fields = descriptor.fields.borrow();
		let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
		assert_eq!(names, vec![".vtable", ".hashcode", "x"]);
	}

	#[test]
	fn override_resolution_keeps_base_vtable_index() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let a = ClassFile {
			name: "a/A".to_string(),
			super_class: Some("java/lang/Object".to_string()),
			interfaces: vec![],
			fields: vec![],
			methods: vec![MethodInfo {
				name: "m".to_string(),
				descriptor: "()V".to_string(),
				flags: MethodFlags::HAS_BODY,
			}],
			is_interface: false,
			is_abstract: false,
		};
		let b = ClassFile {
			name: "a/B".to_string(),
			super_class: Some("a/A".to_string()),
			interfaces: vec![],
			fields: vec![],
			methods: vec![MethodInfo {
				name: "m".to_string(),
				descriptor: "()V".to_string(),
				flags: MethodFlags::HAS_BODY,
			}],
			is_interface: false,
			is_abstract: false,
		};
		let loader = MemoryClassFileLoader::new().with_class(object_class()).with_class(a).with_class(b);
		let functions = MemoryFunctionManager::new();
		functions.mark_used("a/A.m()V");

		let descriptor = registry.value_of("a/B").unwrap();
		let scanner = HierarchyScanner::new(&registry, &loader, &functions);
		scanner.scan_type_hierarchy().unwrap();

		let vtable = descriptor.vtable.borrow();
		assert_eq!(vtable.len(), 1);
		assert_eq!(vtable[0].function_name, "a/B.m()V");
		assert_eq!(functions.vtable_index("a/B.m()V"), Some(5));
	}

	#[test]
	fn default_method_is_adopted_into_vtable_and_itable() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let interface_i = ClassFile {
			name: "a/I".to_string(),
			super_class: None,
			interfaces: vec![],
			fields: vec![],
			methods: vec![MethodInfo {
				name: "f".to_string(),
				descriptor: "()V".to_string(),
				flags: MethodFlags::HAS_BODY,
			}],
			is_interface: true,
			is_abstract: true,
		};
		let class_c = ClassFile {
			name: "a/C".to_string(),
			super_class: Some("java/lang/Object".to_string()),
			interfaces: vec!["a/I".to_string()],
			fields: vec![],
			methods: vec![],
			is_interface: false,
			is_abstract: false,
		};
		let loader =
			MemoryClassFileLoader::new().with_class(object_class()).with_class(interface_i).with_class(class_c);
		let functions = MemoryFunctionManager::new();
		functions.mark_used("a/I.f()V");

		let descriptor = registry.value_of("a/C").unwrap();
		let scanner = HierarchyScanner::new(&registry, &loader, &functions);
		scanner.scan_type_hierarchy().unwrap();

		let vtable = descriptor.vtable.borrow();
		assert_eq!(vtable.len(), 1);
		assert_eq!(vtable[0].function_name, "a/I.f()V");

		let interface_methods = descriptor.interface_methods.borrow();
		let i_descriptor = registry.value_of("a/I").unwrap();
		let entry = interface_methods.iter().find(|(idx, _)| *idx == i_descriptor.class_index).unwrap();
		assert_eq!(entry.1, vec!["a/I.f()V".to_string()]);
		assert_eq!(functions.itable_index("a/I.f()V"), Some(2));
	}

	#[test]
	fn missing_interface_implementation_is_an_error() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let interface_i = ClassFile {
			name: "a/I".to_string(),
			super_class: None,
			interfaces: vec![],
			fields: vec![],
			methods: vec![MethodInfo {
				name: "f".to_string(),
				descriptor: "()V".to_string(),
				flags: MethodFlags::ABSTRACT,
			}],
			is_interface: true,
			is_abstract: true,
		};
		let class_c = ClassFile {
			name: "a/C".to_string(),
			super_class: Some("java/lang/Object".to_string()),
			interfaces: vec!["a/I".to_string()],
			fields: vec![],
			methods: vec![],
			is_interface: false,
			is_abstract: false,
		};
		let loader =
			MemoryClassFileLoader::new().with_class(object_class()).with_class(interface_i).with_class(class_c);
		let functions = MemoryFunctionManager::new();
		functions.mark_used("a/I.f()V");

		registry.value_of("a/C").unwrap();
		let scanner = HierarchyScanner::new(&registry, &loader, &functions);
		let err = scanner.scan_type_hierarchy().unwrap_err();
		assert!(matches!(err, TypeManagerError::MissingImplementation { .. }));
	}

	#[test]
	fn conflicting_defaults_resolve_first_interface_wins() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let interface_i1 = ClassFile {
			name: "a/I1".to_string(),
			super_class: None,
			interfaces: vec![],
			fields: vec![],
			methods: vec![MethodInfo {
				name: "f".to_string(),
				descriptor: "()V".to_string(),
				flags: MethodFlags::HAS_BODY,
			}],
			is_interface: true,
			is_abstract: true,
		};
		let interface_i2 = ClassFile {
			name: "a/I2".to_string(),
			super_class: None,
			interfaces: vec![],
			fields: vec![],
			methods: vec![MethodInfo {
				name: "f".to_string(),
				descriptor: "()V".to_string(),
				flags: MethodFlags::HAS_BODY,
			}],
			is_interface: true,
			is_abstract: true,
		};
		let class_c = ClassFile {
			name: "a/C".to_string(),
			super_class: Some("java/lang/Object".to_string()),
			interfaces: vec!["a/I1".to_string(), "a/I2".to_string()],
			fields: vec![],
			methods: vec![],
			is_interface: false,
			is_abstract: false,
		};
		let loader = MemoryClassFileLoader::new()
			.with_class(object_class())
			.with_class(interface_i1)
			.with_class(interface_i2)
			.with_class(class_c);
		let functions = MemoryFunctionManager::new();
		functions.mark_used("a/I1.f()V");
		functions.mark_used("a/I2.f()V");

		let descriptor = registry.value_of("a/C").unwrap();
		let scanner = HierarchyScanner::new(&registry, &loader, &functions);
		scanner.scan_type_hierarchy().unwrap();

		let vtable = descriptor.vtable.borrow();
		assert_eq!(vtable.len(), 1);
		assert_eq!(vtable[0].function_name, "a/I1.f()V", "first-discovered default must win");
	}

	#[test]
	fn instanceof_non_match_for_unrelated_type() {
		let bump = Bump::new();
		let registry = TypeRegistry::new(&bump, ArrayRepresentation::LinearMemory);
		let x = ClassFile {
			name: "a/X".to_string(),
			super_class: Some("java/lang/Object".to_string()),
			interfaces: vec![],
			fields: vec![],
			methods: vec![],
			is_interface: false,
			is_abstract: false,
		};
		let y = ClassFile {
			name: "a/Y".to_string(),
			super_class: Some("java/lang/Object".to_string()),
			interfaces: vec![],
			fields: vec![],
			methods: vec![],
			is_interface: false,
			is_abstract: false,
		};
		let loader = MemoryClassFileLoader::new().with_class(object_class()).with_class(x).with_class(y);
		let functions = MemoryFunctionManager::new();

		let x_descriptor = registry.value_of("a/X").unwrap();
		let y_descriptor = registry.value_of("a/Y").unwrap();
		let scanner = HierarchyScanner::new(&registry, &loader, &functions);
		scanner.scan_type_hierarchy().unwrap();

		assert!(x_descriptor.is_instance_of(x_descriptor.class_index));
		assert!(!x_descriptor.is_instance_of(y_descriptor.class_index));
	}
}
