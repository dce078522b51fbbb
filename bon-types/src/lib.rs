pub mod ctx;
pub mod module;

pub use ctx::{TypeCtx, TypeError, FN_CTOR, SUM_CTOR, TUPLE_CTOR};
pub use module::{ConstructorLayout, FnSig, FunctionKey, ModuleState, StructLayout};
