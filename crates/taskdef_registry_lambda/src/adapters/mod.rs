pub mod dynamodb_lock_table;
pub mod ecs_registrar;
