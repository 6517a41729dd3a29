//! Browser launch options passed to the sidecar for every new session.

use serde::{Deserialize, Serialize};

/// User agent the sessions present to WhatsApp Web.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, \
                                      like Gecko) Ubuntu Chromium/60.0.3112.78 \
                                      Chrome/60.0.3112.78 Safari/537.36";

/// Fixed Chromium configuration shared by every client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchOptions {
    /// Run the browser without a visible window.
    pub headless: bool,

    /// Pass `--no-sandbox` (required when running as root in containers).
    pub no_sandbox: bool,

    /// Pass `--disable-gpu`.
    pub disable_gpu: bool,

    /// Window size as `width,height`.
    pub window_size: String,

    pub user_agent: String,
}

impl LaunchOptions {
    /// Render the options as Chromium command-line switches.
    pub fn chrome_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("window-size={}", self.window_size),
            format!("--user-agent={}", self.user_agent),
        ];
        if self.headless {
            args.push("--headless".into());
        }
        if self.no_sandbox {
            args.push("--no-sandbox".into());
        }
        if self.disable_gpu {
            args.push("--disable-gpu".into());
        }
        args
    }
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: false,
            no_sandbox: true,
            disable_gpu: true,
            window_size: "910,512".into(),
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}
