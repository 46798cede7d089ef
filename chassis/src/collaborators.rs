//! External collaborators (§6 of the overview): the class-file loader (C1), the function
//! manager (C2) and the string pool (C3). These subsystems are out of scope for this crate —
//! a real compiler plugs in a class-file parser, a module-wide symbol table and an interner —
//! but the type manager's contract with them is part of this crate's public surface, so they
//! are modeled here as traits plus small in-memory reference implementations used by the test
//! suite and suitable for prototyping a driver against this crate before a real parser exists.

use bitflags::bitflags;
use fxhash::FxHashMap;
use std::cell::RefCell;

use crate::error::{Result, TypeManagerError};
use crate::value_type::FieldType;

bitflags! {
	/// Declared-method modifiers relevant to hierarchy scanning, mirroring how a class-file's
	/// own method table packs these as a bitmask rather than separate boolean columns.
	#[derive(Debug, Copy, Clone, Eq, PartialEq)]
	pub struct MethodFlags: u16 {
		const STATIC      = 0b0000_0001;
		const CONSTRUCTOR = 0b0000_0010;
		const ABSTRACT    = 0b0000_0100;
		const HAS_BODY    = 0b0000_1000;
	}
}

/// Whether array instances are backed by a GC-proposal array type (with a sibling
/// `array_native` descriptor, §3.3) or by a raw linear-memory region addressed through an
/// `i32` byte offset. A compiler-wide choice, orthogonal to everything else this crate does.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ArrayRepresentation {
	GcArray,
	LinearMemory,
}

/// One field as declared by a class file, independent of whether any compiled method actually
/// needs it yet (that's tracked separately via `neededFields`/`mark_field_needed`).
#[derive(Debug, Clone)]
pub struct FieldInfo {
	pub name: String,
	pub ty: FieldType,
	pub is_static: bool,
}

/// One method as declared by a class file. An interface method with `HAS_BODY` set is a
/// Java 8+-style "default" method; such methods participate in v-table construction the same
/// way a concrete class method does (§4.2.1 step 6).
#[derive(Debug, Clone)]
pub struct MethodInfo {
	pub name: String,
	pub descriptor: String,
	pub flags: MethodFlags,
}

impl MethodInfo {
	pub fn is_static(&self) -> bool {
		self.flags.contains(MethodFlags::STATIC)
	}

	pub fn is_constructor(&self) -> bool {
		self.flags.contains(MethodFlags::CONSTRUCTOR)
	}

	pub fn has_body(&self) -> bool {
		self.flags.contains(MethodFlags::HAS_BODY)
	}

	/// The function name this crate uses as a v-table/i-table key: a concrete method is
	/// identified by its declaring class together with its name and descriptor, since two
	/// classes may each declare a method with the same name and signature.
	pub fn qualified_name(&self, declaring_class: &str) -> String {
		format!("{declaring_class}.{}{}", self.name, self.descriptor)
	}
}

/// A parsed class file, as handed back by the loader. Only the shape the type manager cares
/// about: superclass, directly implemented interfaces, declared fields and methods.
#[derive(Debug, Clone)]
pub struct ClassFile {
	pub name: String,
	pub super_class: Option<String>,
	pub interfaces: Vec<String>,
	pub fields: Vec<FieldInfo>,
	pub methods: Vec<MethodInfo>,
	pub is_interface: bool,
	pub is_abstract: bool,
}

/// C1. Resolves a type name to its parsed class file. Caching, if any, is owned entirely by
/// the implementation; this crate never caches a `ClassFile` itself.
pub trait ClassFileLoader {
	fn load(&self, name: &str) -> Result<ClassFile>;
}

/// An in-memory loader backed by a fixed table of class files, used by tests and by anything
/// prototyping against this crate without a real class-file parser.
#[derive(Debug, Default)]
pub struct MemoryClassFileLoader {
	classes: FxHashMap<String, ClassFile>,
}

impl MemoryClassFileLoader {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_class(mut self, class: ClassFile) -> Self {
		self.classes.insert(class.name.clone(), class);
		self
	}
}

impl ClassFileLoader for MemoryClassFileLoader {
	fn load(&self, name: &str) -> Result<ClassFile> {
		self.classes
			.get(name)
			.cloned()
			.ok_or_else(|| TypeManagerError::MissingClass { name: name.to_string() })
	}
}

/// C2. Tracks which function names are reachable ("used"), assigns v-table/i-table indices to
/// used methods, and provides the function-name → numeric-id lookup consumed at emission time
/// (§6.1's v-table/i-table slots store these ids, not names).
pub trait FunctionManager {
	/// Marks `name` as used (reachable from compiled code). Idempotent.
	fn mark_used(&self, name: &str);
	/// True once `mark_used` has been called for `name`.
	fn is_used(&self, name: &str) -> bool;
	/// Records that `name` occupies v-table index `index` (the spec's "slot + 5").
	fn set_vtable_index(&self, name: &str, index: u32);
	/// Records that `name` occupies i-table index `index` within whichever interface it
	/// implements (the spec's "current length + 1").
	fn set_itable_index(&self, name: &str, index: u32);
	/// The numeric function index assigned to `name` at emission time. Returns `None` before
	/// the module writer has run; the metadata emitter (C7) only calls this after function
	/// indices are final.
	fn function_index(&self, name: &str) -> Option<u32>;
	fn vtable_index(&self, name: &str) -> Option<u32>;
	fn itable_index(&self, name: &str) -> Option<u32>;
	/// Registers a synthesized function (a lambda wrapper or a dispatch routine) with its Wasm
	/// function body, returning the numeric function index the module writer assigned it.
	fn register_synthetic(&self, name: &str, body: Vec<u8>) -> u32;
}

#[derive(Debug, Default)]
struct FunctionRecord {
	used: bool,
	vtable_index: Option<u32>,
	itable_index: Option<u32>,
	function_index: Option<u32>,
}

/// A single-threaded, in-memory function manager suitable for tests: function indices are
/// assigned in registration order starting at zero, matching how a real module writer assigns
/// indices to functions as it encounters them.
#[derive(Debug, Default)]
pub struct MemoryFunctionManager {
	records: RefCell<FxHashMap<String, FunctionRecord>>,
	next_function_index: RefCell<u32>,
}

impl MemoryFunctionManager {
	pub fn new() -> Self {
		Self::default()
	}

	/// Declares `name` as an ordinary, already-emitted function (as if the module writer had
	/// assigned it a function index via the out-of-scope code builder). Real compilers assign
	/// function indices as methods are translated; this lets tests set that up directly.
	pub fn declare_function(&self, name: &str, index: u32) {
		let mut records = self.records.borrow_mut();
		let record = records.entry(name.to_string()).or_default();
		record.function_index = Some(index);
		let mut next = self.next_function_index.borrow_mut();
		if index >= *next {
			*next = index + 1;
		}
	}
}

impl FunctionManager for MemoryFunctionManager {
	fn mark_used(&self, name: &str) {
		self.records.borrow_mut().entry(name.to_string()).or_default().used = true;
	}

	fn is_used(&self, name: &str) -> bool {
		self.records.borrow().get(name).map(|r| r.used).unwrap_or(false)
	}

	fn set_vtable_index(&self, name: &str, index: u32) {
		self.records.borrow_mut().entry(name.to_string()).or_default().vtable_index = Some(index);
	}

	fn set_itable_index(&self, name: &str, index: u32) {
		self.records.borrow_mut().entry(name.to_string()).or_default().itable_index = Some(index);
	}

	fn function_index(&self, name: &str) -> Option<u32> {
		self.records.borrow().get(name).and_then(|r| r.function_index)
	}

	fn vtable_index(&self, name: &str) -> Option<u32> {
		self.records.borrow().get(name).and_then(|r| r.vtable_index)
	}

	fn itable_index(&self, name: &str) -> Option<u32> {
		self.records.borrow().get(name).and_then(|r| r.itable_index)
	}

	fn register_synthetic(&self, name: &str, _body: Vec<u8>) -> u32 {
		let mut records = self.records.borrow_mut();
		let mut next = self.next_function_index.borrow_mut();
		let index = *next;
		*next += 1;
		records.entry(name.to_string()).or_default().function_index = Some(index);
		index
	}
}

/// C3. Interns strings referenced by type metadata (class names, field names), returning a
/// stable integer id the metadata blob embeds (§6.1's `TYPE_NAME`).
pub trait StringPool {
	fn intern(&self, s: &str) -> u32;
	fn resolve(&self, id: u32) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct InterningStringPool {
	ids: RefCell<FxHashMap<String, u32>>,
	strings: RefCell<Vec<String>>,
}

impl InterningStringPool {
	pub fn new() -> Self {
		Self::default()
	}
}

impl StringPool for InterningStringPool {
	fn intern(&self, s: &str) -> u32 {
		if let Some(id) = self.ids.borrow().get(s) {
			return *id;
		}
		let mut strings = self.strings.borrow_mut();
		let id = strings.len() as u32;
		strings.push(s.to_string());
		self.ids.borrow_mut().insert(s.to_string(), id);
		id
	}

	fn resolve(&self, id: u32) -> Option<String> {
		self.strings.borrow().get(id as usize).cloned()
	}
}
