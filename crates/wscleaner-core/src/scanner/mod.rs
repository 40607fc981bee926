pub mod walk;

pub use walk::{find_matching_file_names, list_child_directories, ChildDirectory};
