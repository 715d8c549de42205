//! Task monitor core: session model, batch-analysis state machine and view-state helpers.
mod batch;
mod effect;
pub mod filter;
pub mod model;
mod msg;
mod redirect;
mod session;
mod state;
mod update;

pub use batch::{BatchAccepted, BatchProgress, BatchStatus, FailedItem};
pub use effect::BatchEffect;
pub use filter::{JobListView, SortOrder};
pub use msg::BatchMsg;
pub use redirect::{
    encode_uri_component, is_auth_path, is_login_location, login_redirect_url,
    return_path_after_login, LOGIN_PAGE,
};
pub use session::{Session, BATCH_ID_KEY, TOKEN_KEY, USERNAME_KEY};
pub use state::{BatchState, BatchView};
pub use update::update;
