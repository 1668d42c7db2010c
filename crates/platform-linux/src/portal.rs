//! XDG Desktop Portal integration for Wayland consent.
//!
//! # Flow
//!
//! 1. Connect to `org.freedesktop.portal.ScreenCast` via DBus
//! 2. Create a session
//! 3. Select monitor sources with the cursor hidden
//! 4. Start the stream; the compositor shows its consent dialog
//! 5. A returned stream means consent was given; the session is closed
//!    again because capture itself is negotiated per session

/// Run the consent flow to completion on the calling thread.
///
/// Returns `true` when the user granted access to at least one monitor.
#[cfg(feature = "portal")]
pub fn request_consent_blocking() -> bool {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build runtime for portal request");
            return false;
        }
    };

    match runtime.block_on(request_screencast_consent()) {
        Ok(streams) => streams > 0,
        Err(e) => {
            tracing::warn!(error = %e, "ScreenCast portal request failed");
            false
        }
    }
}

#[cfg(not(feature = "portal"))]
pub fn request_consent_blocking() -> bool {
    tracing::warn!("Built without the `portal` feature; Wayland consent cannot be requested");
    false
}

/// Request a ScreenCast session and report how many streams were granted.
#[cfg(feature = "portal")]
pub async fn request_screencast_consent() -> screentap_common::ScreentapResult<usize> {
    use ashpd::desktop::screencast::{CursorMode, Screencast, SourceType};
    use ashpd::desktop::PersistMode;
    use screentap_common::ScreentapError;

    tracing::info!("Requesting XDG ScreenCast session");

    let portal_err = |e: ashpd::Error| ScreentapError::platform(format!("ScreenCast portal: {e}"));

    let proxy = Screencast::new().await.map_err(portal_err)?;
    let session = proxy.create_session().await.map_err(portal_err)?;
    proxy
        .select_sources(
            &session,
            CursorMode::Hidden,
            SourceType::Monitor.into(),
            false,
            None,
            PersistMode::DoNot,
        )
        .await
        .map_err(portal_err)?;

    let response = proxy
        .start(&session, None)
        .await
        .map_err(portal_err)?
        .response()
        .map_err(portal_err)?;
    let streams = response.streams().len();

    if let Err(e) = session.close().await {
        tracing::debug!(error = %e, "Failed to close portal session");
    }
    Ok(streams)
}

/// Check if the XDG ScreenCast portal can be used from this build.
pub fn is_portal_available() -> bool {
    cfg!(feature = "portal")
        && (std::env::var("WAYLAND_DISPLAY").is_ok()
            || std::env::var("XDG_SESSION_TYPE")
                .map(|v| v == "wayland")
                .unwrap_or(false))
}
