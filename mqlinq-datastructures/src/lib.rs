pub mod scope_stack;
pub mod unique_linked_hash_map;
