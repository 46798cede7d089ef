//! C8: interning of function-signature-shaped control-block types (§3.5, §4.5).

use std::cell::RefCell;

use crate::value_type::WasmValType;

/// A value of kind "function signature used as a control-block shape": an ordered
/// parameter/result list pair. Two block types are equal iff both lists are element-wise
/// equal (§3.5) — that equality is exactly what makes interning meaningful.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct BlockType {
	pub params: Vec<WasmValType>,
	pub results: Vec<WasmValType>,
}

/// A stable handle into a [`BlockTypeTable`], cheap to copy and compare. Frozen at emission
/// (§3.5's lifecycle): once the table hands out codes, a handle's code never changes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlockTypeHandle(pub usize);

/// Structural-equality interning over (params, results). On emission each distinct block type
/// receives an integer code from the module writer; codes are never reused (§4.5).
#[derive(Debug, Default)]
pub struct BlockTypeTable {
	entries: RefCell<Vec<BlockType>>,
	codes: RefCell<Vec<Option<u32>>>,
}

impl BlockTypeTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Interns `(params, results)`, created lazily on first reference (§3.5). Returns the same
	/// handle for any subsequent call with a structurally equal shape.
	pub fn intern(&self, params: Vec<WasmValType>, results: Vec<WasmValType>) -> BlockTypeHandle {
		let shape = BlockType { params, results };
		let mut entries = self.entries.borrow_mut();
		if let Some(idx) = entries.iter().position(|e| *e == shape) {
			return BlockTypeHandle(idx);
		}
		entries.push(shape);
		self.codes.borrow_mut().push(None);
		BlockTypeHandle(entries.len() - 1)
	}

	pub fn get(&self, handle: BlockTypeHandle) -> BlockType {
		self.entries.borrow()[handle.0].clone()
	}

	pub fn len(&self) -> usize {
		self.entries.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Assigns codes to every interned block type, in interning order, via `next_code`. Meant
	/// to be called exactly once, when the module writer begins emission.
	pub fn assign_codes(&self, mut next_code: impl FnMut(&BlockType) -> u32) {
		let entries = self.entries.borrow();
		let mut codes = self.codes.borrow_mut();
		for (entry, code) in entries.iter().zip(codes.iter_mut()) {
			if code.is_none() {
				*code = Some(next_code(entry));
			}
		}
	}

	pub fn code(&self, handle: BlockTypeHandle) -> Option<u32> {
		self.codes.borrow()[handle.0]
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value_type::WasmValType::*;

	#[test]
	fn interning_is_idempotent() {
		let table = BlockTypeTable::new();
		let a = table.intern(vec![I32, I32], vec![I32]);
		let b = table.intern(vec![I32, I32], vec![I32]);
		assert_eq!(a, b);
		assert_eq!(table.len(), 1);
	}

	#[test]
	fn distinct_shapes_get_distinct_handles() {
		let table = BlockTypeTable::new();
		let a = table.intern(vec![I32], vec![]);
		let b = table.intern(vec![I64], vec![]);
		assert_ne!(a, b);
		assert_eq!(table.len(), 2);
	}

	#[test]
	fn codes_assigned_once_in_interning_order() {
		let table = BlockTypeTable::new();
		let a = table.intern(vec![I32], vec![]);
		let b = table.intern(vec![I64], vec![]);
		let mut next = 10;
		table.assign_codes(|_| {
			let code = next;
			next += 1;
			code
		});
		assert_eq!(table.code(a), Some(10));
		assert_eq!(table.code(b), Some(11));
	}
}
