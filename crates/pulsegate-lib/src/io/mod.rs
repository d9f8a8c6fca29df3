pub mod csv;
pub mod request;
pub mod text;
