//! Per-address throttle in front of every route.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    api::extract::{ClientAddr, SharedState},
    auth::rate_limit::{enforce, Discriminator},
};

pub async fn global(
    state: SharedState,
    ClientAddr(caller_address): ClientAddr,
    request: Request,
    next: Next,
) -> Response {
    let discriminator = Discriminator::from_request(None, caller_address.as_deref());
    if let Err(err) = enforce(state.session().limiters().global.as_ref(), &discriminator) {
        return err.into_response();
    }
    next.run(request).await
}
