pub mod authority;
pub mod profile;
pub mod round;
pub mod session;
pub mod store;
pub mod test_helpers;
pub mod types;
pub mod view;

pub use authority::{
    AuthorityClient,
    AuthorityError,
};
pub use round::{
    RoundController,
    RoundEvent,
};
pub use session::SessionManager;
