pub mod identity;
pub mod log;
pub mod rename;
pub mod strip;

pub use self::identity::IdentityTransformer;
pub use self::log::LogTransformer;
pub use self::rename::RenameTransformer;
pub use self::strip::StripTransformer;
