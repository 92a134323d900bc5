pub mod mimetype;
pub mod phash;
