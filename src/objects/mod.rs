pub mod object;
pub mod string;
pub mod list;
pub mod dict;
pub mod function;
pub mod closure;
pub mod upvalue;
pub mod class;
pub mod instance;
pub mod bound_method;
pub mod native;

pub use object::{Object, ObjectType, GcSize};
pub use string::ObjectString;
pub use list::ObjectList;
pub use dict::ObjectDict;
pub use function::ObjectFunction;
pub use closure::ObjectClosure;
pub use upvalue::ObjectUpvalue;
pub use class::ObjectClass;
pub use instance::ObjectInstance;
pub use bound_method::ObjectBoundMethod;
pub use native::{ObjectNative, NativeFn};
