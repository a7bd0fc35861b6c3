crate::declare_id!("11111111111111111111111111111111");
