pub mod config;
pub mod db;
pub mod server;
pub mod tokio_tools;
pub mod tournament;
pub mod upstream;

#[cfg(test)]
pub mod test_support;
