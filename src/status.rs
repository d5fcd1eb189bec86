use crate::error::{Result, WebOsError};
use crate::manager::ConnectionManager;
use crate::protocol::{LIVE_TV_APP_ID, URI_FOREGROUND_APP, URI_LIST_APPS, URI_PROGRAM_INFO};
use crate::transport::Session;
use crate::types::{DeviceStatus, ForegroundApp, NowPlaying, DEVICE_TIME_FORMAT};
use serde_json::Value;

/// Answers "is the television on, and what is it showing"
///
/// A device without a usable session is reported `Off`. A failed query is
/// retried once, on a fresh session if the old one broke; a second failure
/// also reports `Off`.
#[derive(Clone)]
pub struct StatusPoller {
    manager: ConnectionManager,
}

impl StatusPoller {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub async fn get_status(&self) -> DeviceStatus {
        let session = match self.manager.ensure_connected().await {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!("No session, reporting off: {}", e);
                return DeviceStatus::Off;
            }
        };

        match foreground_app(session.as_ref()).await {
            Ok(app) => return on_status(session.as_ref(), app).await,
            Err(e) => {
                tracing::info!("Status query failed, retrying once: {}", e);
                if e.is_transport() {
                    self.manager.invalidate(&session);
                }
            }
        }

        let session = match self.manager.ensure_connected().await {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!("Reconnect failed, reporting off: {}", e);
                return DeviceStatus::Off;
            }
        };

        match foreground_app(session.as_ref()).await {
            Ok(app) => on_status(session.as_ref(), app).await,
            Err(e) => {
                tracing::info!("Status query failed again, reporting off: {}", e);
                if e.is_transport() {
                    self.manager.invalidate(&session);
                }
                DeviceStatus::Off
            }
        }
    }
}

async fn foreground_app(session: &dyn Session) -> Result<ForegroundApp> {
    let foreground = session.request(URI_FOREGROUND_APP, None).await?;
    let app_id = foreground
        .get("appId")
        .and_then(|v| v.as_str())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| WebOsError::InvalidResponse("No appId in foreground reply".to_string()))?;

    let apps = session.request(URI_LIST_APPS, None).await?;
    Ok(lookup_app(&apps, app_id))
}

async fn on_status(session: &dyn Session, app: ForegroundApp) -> DeviceStatus {
    let now_playing = if app.id == LIVE_TV_APP_ID {
        match session.request(URI_PROGRAM_INFO, None).await {
            Ok(info) => {
                let now = chrono::Local::now().format(DEVICE_TIME_FORMAT).to_string();
                current_program(&info, &now)
            }
            Err(e) => {
                tracing::debug!("No programme information: {}", e);
                None
            }
        }
    } else {
        None
    };

    DeviceStatus::On { app, now_playing }
}

/// Find `app_id` in a `listApps` payload; unknown apps keep only their id
fn lookup_app(apps: &Value, app_id: &str) -> ForegroundApp {
    let entry = apps
        .get("apps")
        .and_then(|v| v.as_array())
        .and_then(|apps| {
            apps.iter()
                .find(|app| app.get("id").and_then(|v| v.as_str()) == Some(app_id))
        });

    let field = |name: &str| {
        entry
            .and_then(|app| app.get(name))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    ForegroundApp {
        id: app_id.to_string(),
        title: field("title"),
        icon: field("icon"),
    }
}

/// Programme whose window strictly contains `now`. Device timestamps sort
/// lexicographically, so plain string comparison is enough.
fn current_program(info: &Value, now: &str) -> Option<NowPlaying> {
    let channel_name = info
        .get("channel")
        .and_then(|c| c.get("channelName"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    info.get("programList")?
        .as_array()?
        .iter()
        .find_map(|show| {
            let start = show.get("localStartTime")?.as_str()?;
            let end = show.get("localEndTime")?.as_str()?;
            if start < now && end > now {
                Some(NowPlaying {
                    channel_name: channel_name.to_string(),
                    program_name: show
                        .get("programName")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    start_time: start.to_string(),
                    end_time: end.to_string(),
                })
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn program_info() -> Value {
        json!({
            "channel": { "channelName": "ZDF HD" },
            "programList": [
                { "programName": "heute", "localStartTime": "2022,06,14,19,00,00", "localEndTime": "2022,06,14,19,20,00" },
                { "programName": "Wetter", "localStartTime": "2022,06,14,19,20,00", "localEndTime": "2022,06,14,19,25,00" },
                { "programName": "Film", "localStartTime": "2022,06,14,20,15,00", "localEndTime": "2022,06,14,21,45,00" }
            ]
        })
    }

    #[test]
    fn picks_the_running_programme() {
        let show = current_program(&program_info(), "2022,06,14,20,30,00").unwrap();
        assert_eq!(show.channel_name, "ZDF HD");
        assert_eq!(show.program_name, "Film");
        assert_eq!(show.start_time, "2022,06,14,20,15,00");
    }

    #[test]
    fn window_bounds_are_exclusive() {
        // Exactly at a boundary neither programme strictly contains now
        assert_eq!(current_program(&program_info(), "2022,06,14,19,20,00"), None);
        assert_eq!(current_program(&program_info(), "2022,06,14,20,00,00"), None);
    }

    #[test]
    fn missing_program_list_is_none() {
        assert_eq!(current_program(&json!({ "channel": {} }), "2022,06,14,20,30,00"), None);
    }

    #[test]
    fn lookup_app_enriches_known_apps() {
        let apps = json!({
            "apps": [
                { "id": "netflix", "title": "Netflix", "icon": "http://tv/netflix.png" },
                { "id": "com.webos.app.livetv", "title": "Live TV" }
            ]
        });

        let app = lookup_app(&apps, "netflix");
        assert_eq!(app.title.as_deref(), Some("Netflix"));
        assert_eq!(app.icon.as_deref(), Some("http://tv/netflix.png"));

        let unknown = lookup_app(&apps, "youtube.leanback.v4");
        assert_eq!(unknown.id, "youtube.leanback.v4");
        assert_eq!(unknown.title, None);
    }
}
