//! The original, long-deprecated bytecode loader.

crate::declare_id!("BPFLoader1111111111111111111111111111111111");
