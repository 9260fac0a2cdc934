pub(crate) mod async_task;
pub(crate) mod time;
pub mod wildcard;

#[cfg(test)]
mod async_task_test;
