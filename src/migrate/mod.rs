pub mod constraint_gate;
pub mod migration_options;
pub mod migration_result;
pub mod migrator;
pub mod table_migrator;
