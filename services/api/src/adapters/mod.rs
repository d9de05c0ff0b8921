pub mod db;
pub mod flutterwave;
pub mod memory;

pub use db::DbAdapter;
pub use flutterwave::FlutterwaveAdapter;
pub use memory::InMemoryStore;
