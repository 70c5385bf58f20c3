pub mod layout;
pub mod timeline;
