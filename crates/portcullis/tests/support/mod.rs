#![allow(unused_imports)]

pub use portcullis::oauth::mock::{MockClient, Recorded, lookup, oauth_header_params};
