mod common;
mod reviews;
