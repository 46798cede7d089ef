//! C6: the [`DispatchSynthesizer`] — the four routines that implement dynamic dispatch and
//! subtype testing at runtime (§4.3). Each is authored as WebAssembly text, parsed through the
//! same pipeline user code goes through (§9's debuggability note), then handed to the function
//! manager as a registered replacement for the CFBC-level primitive of the same name.

use crate::collaborators::FunctionManager;

/// `this` is a raw `i32` byte offset into the linear-memory data image: the address of the
/// instance's object header, whose first word is the pointer to its type's metadata blob. This
/// holds regardless of [`ArrayRepresentation`](crate::collaborators::ArrayRepresentation) — a
/// GC-represented instance's header field is unwrapped to this same `i32` before any of these
/// routines are called.
pub struct DispatchSynthesizer<'a> {
	functions: &'a dyn FunctionManager,
}

const CALL_VIRTUAL_WAT: &str = r#"
(module
  (func $callVirtual (export "callVirtual") (param $this i32) (param $vFuncIndex i32) (result i32)
    (i32.load
      (i32.add
        (i32.load (local.get $this))
        (local.get $vFuncIndex)))))
"#;

const CALL_INTERFACE_WAT: &str = r#"
(module
  (func $callInterface (export "callInterface")
    (param $this i32) (param $classIndex i32) (param $vFuncIndex i32) (result i32)
    (local $vtable i32)
    (local $block i32)
    (local $blockClassIndex i32)
    (local.set $vtable (i32.load (local.get $this)))
    (local.set $block (i32.add (local.get $vtable) (i32.load (local.get $vtable))))
    (loop $scan
      (local.set $blockClassIndex (i32.load (local.get $block)))
      (if (i32.eqz (local.get $blockClassIndex)) (then (unreachable)))
      (if (i32.eq (local.get $blockClassIndex) (local.get $classIndex))
        (then (return (i32.load (i32.add (local.get $block) (local.get $vFuncIndex))))))
      (local.set $block (i32.add (local.get $block) (i32.load (i32.add (local.get $block) (i32.const 4)))))
      (br $scan))
    (unreachable)))
"#;

const INSTANCEOF_WAT: &str = r#"
(module
  (func $instanceof (export "instanceof") (param $this i32) (param $classIndex i32) (result i32)
    (local $vtable i32)
    (local $list i32)
    (local $count i32)
    (local $i i32)
    (if (i32.eqz (local.get $this)) (then (return (i32.const 0))))
    (local.set $vtable (i32.load (local.get $this)))
    (local.set $list (i32.add (local.get $vtable) (i32.load (i32.add (local.get $vtable) (i32.const 4)))))
    (local.set $count (i32.load (local.get $list)))
    (local.set $i (i32.const 0))
    (block $done
      (loop $scan
        (br_if $done (i32.ge_u (local.get $i) (local.get $count)))
        (if (i32.eq
              (i32.load (i32.add (local.get $list) (i32.add (i32.const 4) (i32.mul (local.get $i) (i32.const 4)))))
              (local.get $classIndex))
          (then (return (i32.const 1))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $scan)))
    (i32.const 0)))
"#;

const CAST_WAT: &str = r#"
(module
  (func $cast (export "cast") (param $this i32) (param $classIndex i32) (result i32)
    (local $vtable i32)
    (local $list i32)
    (local $count i32)
    (local $i i32)
    (if (i32.eqz (local.get $this)) (then (return (local.get $this))))
    (local.set $vtable (i32.load (local.get $this)))
    (local.set $list (i32.add (local.get $vtable) (i32.load (i32.add (local.get $vtable) (i32.const 4)))))
    (local.set $count (i32.load (local.get $list)))
    (local.set $i (i32.const 0))
    (block $found
      (loop $scan
        (br_if $found (i32.ge_u (local.get $i) (local.get $count)))
        (if (i32.eq
              (i32.load (i32.add (local.get $list) (i32.add (i32.const 4) (i32.mul (local.get $i) (i32.const 4)))))
              (local.get $classIndex))
          (then (return (local.get $this))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $scan))
      (unreachable))
    (unreachable)))
"#;

/// Parses `wat_module` (a single-function module) and returns the raw bytes of that function's
/// code-section entry — what `FunctionManager::register_synthetic` expects as a function body.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub(crate) fn compile_function_body(wat_module: &str) -> Vec<u8> {
	let binary = wat::parse_str(wat_module).expect("dispatch synthesizer templates are well-formed WAT");
	for payload in wasmparser::Parser::new(0).parse_all(&binary) {
		if let wasmparser::Payload::CodeSectionEntry(body) =
			payload.expect("dispatch synthesizer templates parse as valid Wasm")
		{
			let range = body.range();
			return binary[range].to_vec();
		}
	}
	unreachable!("every dispatch synthesizer template defines exactly one function")
}

impl<'a> DispatchSynthesizer<'a> {
	pub fn new(functions: &'a dyn FunctionManager) -> Self {
		Self { functions }
	}

	/// Registers all four routines with the function manager, under the ABI names consumed by
	/// translated user code (§6.3). Returns their assigned function indices in the fixed order
	/// `(callVirtual, callInterface, instanceof, cast)`.
	pub fn synthesize_all(&self) -> (u32, u32, u32, u32) {
		let call_virtual = self.functions.register_synthetic("callVirtual", compile_function_body(CALL_VIRTUAL_WAT));
		let call_interface =
			self.functions.register_synthetic("callInterface", compile_function_body(CALL_INTERFACE_WAT));
		let instanceof = self.functions.register_synthetic("instanceof", compile_function_body(INSTANCEOF_WAT));
		let cast = self.functions.register_synthetic("cast", compile_function_body(CAST_WAT));
		(call_virtual, call_interface, instanceof, cast)
	}
}
