//! The native loader owns the accounts of the builtin programs.

crate::declare_id!("NativeLoader1111111111111111111111111111111");
