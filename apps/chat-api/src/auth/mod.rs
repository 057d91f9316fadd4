pub mod session;

pub use session::SessionUser;
