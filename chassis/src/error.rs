use std::fmt::{Display, Formatter};

/// Every way the type manager can fail. All variants are fatal to the
/// compilation unit that triggered them; nothing here is retried.
#[derive(Debug)]
pub enum TypeManagerError {
	/// The [`ClassFileLoader`](crate::collaborators::ClassFileLoader) could not find a class
	/// required to resolve a type, a superclass, or an interface.
	MissingClass { name: String },
	/// An interface method was marked used but no concrete implementation could be found
	/// anywhere in the class's superclass chain or its transitive interfaces.
	MissingImplementation { class: String, interface: String, method: String },
	/// A registry mutation (new descriptor, needed field, v-table slot) was attempted after
	/// [`TypeRegistry::finish`](crate::registry::TypeRegistry::finish) latched.
	LateRegistration { what: String },
	/// `arrayType` was asked to build an array over an element kind it does not know how to
	/// lay out.
	UnsupportedType { description: String },
	/// I/O performed by the class-file loader, wrapped to preserve the pure-function contract
	/// of subtype and layout queries.
	Io(std::io::Error),
}

impl Display for TypeManagerError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			TypeManagerError::MissingClass { name } => {
				write!(f, "missing-class: could not resolve `{name}`")
			}
			TypeManagerError::MissingImplementation { class, interface, method } => {
				write!(
					f,
					"missing-implementation: `{class}` has no implementation of `{interface}::{method}`"
				)
			}
			TypeManagerError::LateRegistration { what } => {
				write!(f, "late-registration: {what} occurred after scan finished")
			}
			TypeManagerError::UnsupportedType { description } => {
				write!(f, "unsupported-type: {description}")
			}
			TypeManagerError::Io(err) => write!(f, "io-failure: {err}"),
		}
	}
}

impl std::error::Error for TypeManagerError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			TypeManagerError::Io(err) => Some(err),
			_ => None,
		}
	}
}

impl From<std::io::Error> for TypeManagerError {
	fn from(value: std::io::Error) -> Self {
		TypeManagerError::Io(value)
	}
}

pub type Result<T> = std::result::Result<T, TypeManagerError>;
