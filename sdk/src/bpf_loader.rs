//! The non-upgradeable legacy bytecode loader. Retained only so the runtime
//! can charge compute for its management instructions before rejecting them.

crate::declare_id!("BPFLoader2111111111111111111111111111111111");
