// Consumer-group stream library
pub mod stream;
