pub mod admin_session;
pub mod album;
pub mod category;
pub mod country;
pub mod library_session;
pub mod participant;
pub mod session;
pub mod session_asset;
pub mod session_data;

pub use admin_session::Model as AdminSession;
pub use album::Model as Album;
pub use category::Model as Category;
pub use country::Model as Country;
pub use library_session::Model as LibrarySession;
pub use participant::Model as Participant;
pub use session::Model as Session;
pub use session_asset::Model as SessionAsset;
pub use session_data::Model as SessionData;
