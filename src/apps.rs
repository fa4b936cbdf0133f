//! Catalog of applications Jarvis knows by name.

/// One application: the spoken aliases, what to launch and which process to
/// look for or kill.
#[derive(Debug)]
pub struct App {
    /// Name used in replies.
    pub display: &'static str,
    pub aliases: &'static [&'static str],
    pub windows: Target,
    pub linux: Target,
    pub macos: Target,
}

/// Launch target and process name on one platform.
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub launch: &'static str,
    pub process: &'static str,
}

const fn t(launch: &'static str, process: &'static str) -> Target {
    Target { launch, process }
}

/// Apps whose process reliably shows up right after launch. Others (UWP
/// shims, browsers relaunching into an existing instance) are assumed to be
/// up.
const FOCUS_CHECKED: &[&str] = &["bloco de notas", "calculadora"];

impl App {
    /// Whether pasting into this app should first confirm its process runs.
    pub fn checks_focus(&self) -> bool {
        FOCUS_CHECKED.contains(&self.display)
    }

    /// Target for the platform this binary was built for.
    pub fn target(&self) -> Target {
        if cfg!(target_os = "windows") {
            self.windows
        } else if cfg!(target_os = "macos") {
            self.macos
        } else {
            self.linux
        }
    }
}

pub static APPS: &[App] = &[
    App {
        display: "bloco de notas",
        aliases: &["bloco de notas", "notepad", "bloco", "editor"],
        windows: t("notepad.exe", "notepad.exe"),
        linux: t("gedit", "gedit"),
        macos: t("TextEdit", "TextEdit"),
    },
    App {
        display: "calculadora",
        aliases: &["calculadora", "calculator", "calc"],
        windows: t("calc.exe", "CalculatorApp.exe"),
        linux: t("gnome-calculator", "gnome-calculator"),
        macos: t("Calculator", "Calculator"),
    },
    App {
        display: "paint",
        aliases: &["paint", "mspaint", "editor de imagem"],
        windows: t("mspaint.exe", "mspaint.exe"),
        linux: t("kolourpaint", "kolourpaint"),
        macos: t("Preview", "Preview"),
    },
    App {
        display: "word",
        aliases: &["word"],
        windows: t("winword", "WINWORD.EXE"),
        linux: t("libreoffice --writer", "soffice"),
        macos: t("Microsoft Word", "Microsoft Word"),
    },
    App {
        display: "excel",
        aliases: &["excel"],
        windows: t("excel", "EXCEL.EXE"),
        linux: t("libreoffice --calc", "soffice"),
        macos: t("Microsoft Excel", "Microsoft Excel"),
    },
    App {
        display: "powerpoint",
        aliases: &["powerpoint"],
        windows: t("powerpnt", "POWERPNT.EXE"),
        linux: t("libreoffice --impress", "soffice"),
        macos: t("Microsoft PowerPoint", "Microsoft PowerPoint"),
    },
    App {
        display: "chrome",
        aliases: &["chrome", "google chrome", "navegador"],
        windows: t("chrome", "chrome.exe"),
        linux: t("google-chrome", "chrome"),
        macos: t("Google Chrome", "Google Chrome"),
    },
    App {
        display: "firefox",
        aliases: &["firefox", "mozilla firefox"],
        windows: t("firefox", "firefox.exe"),
        linux: t("firefox", "firefox"),
        macos: t("Firefox", "firefox"),
    },
    App {
        display: "edge",
        aliases: &["edge", "microsoft edge"],
        windows: t("msedge", "msedge.exe"),
        linux: t("microsoft-edge", "msedge"),
        macos: t("Microsoft Edge", "Microsoft Edge"),
    },
    App {
        display: "explorador de arquivos",
        aliases: &[
            "explorer",
            "windows explorer",
            "explorador de arquivos",
            "gerenciador de arquivos",
        ],
        windows: t("explorer.exe", "explorer.exe"),
        linux: t("nautilus", "nautilus"),
        macos: t("Finder", "Finder"),
    },
    App {
        display: "discord",
        aliases: &["discord"],
        windows: t("discord:", "Discord.exe"),
        linux: t("discord", "Discord"),
        macos: t("Discord", "Discord"),
    },
    App {
        display: "vs code",
        aliases: &["vscode", "vs code", "visual studio code", "code"],
        windows: t("code", "Code.exe"),
        linux: t("code", "code"),
        macos: t("Visual Studio Code", "Electron"),
    },
    App {
        display: "spotify",
        aliases: &["spotify"],
        windows: t("spotify:", "Spotify.exe"),
        linux: t("spotify", "spotify"),
        macos: t("Spotify", "Spotify"),
    },
    App {
        display: "vlc",
        aliases: &["vlc"],
        windows: t("vlc", "vlc.exe"),
        linux: t("vlc", "vlc"),
        macos: t("VLC", "VLC"),
    },
    App {
        display: "slack",
        aliases: &["slack"],
        windows: t("slack:", "slack.exe"),
        linux: t("slack", "slack"),
        macos: t("Slack", "Slack"),
    },
    App {
        display: "teams",
        aliases: &["teams", "microsoft teams"],
        windows: t("msteams:", "ms-teams.exe"),
        linux: t("teams-for-linux", "teams-for-linux"),
        macos: t("Microsoft Teams", "MSTeams"),
    },
    App {
        display: "zoom",
        aliases: &["zoom"],
        windows: t("zoommtg:", "Zoom.exe"),
        linux: t("zoom", "zoom"),
        macos: t("zoom.us", "zoom.us"),
    },
    App {
        display: "telegram",
        aliases: &["telegram"],
        windows: t("tg:", "Telegram.exe"),
        linux: t("telegram-desktop", "telegram-desktop"),
        macos: t("Telegram", "Telegram"),
    },
    App {
        display: "whatsapp",
        aliases: &["whatsapp"],
        windows: t("whatsapp:", "WhatsApp.exe"),
        linux: t("https://web.whatsapp.com", "whatsapp"),
        macos: t("WhatsApp", "WhatsApp"),
    },
    App {
        display: "steam",
        aliases: &["steam"],
        windows: t("steam:", "steam.exe"),
        linux: t("steam", "steam"),
        macos: t("Steam", "steam_osx"),
    },
    App {
        display: "opera gx",
        aliases: &["opera gx", "opera"],
        windows: t("opera", "opera.exe"),
        linux: t("opera", "opera"),
        macos: t("Opera GX", "Opera GX"),
    },
    App {
        display: "gerenciador de tarefas",
        aliases: &["gerenciador de tarefas", "task manager"],
        windows: t("taskmgr", "Taskmgr.exe"),
        linux: t("gnome-system-monitor", "gnome-system-monitor"),
        macos: t("Activity Monitor", "Activity Monitor"),
    },
];

/// Look an application up by one of its aliases.
pub fn find(name: &str) -> Option<&'static App> {
    let name = name.trim().to_lowercase();
    APPS.iter().find(|a| a.aliases.contains(&name.as_str()))
}

/// The application whose longest alias occurs (as whole words) in the
/// command. "explorador de arquivos" beats "explorer"; "vs code" beats
/// "code".
pub fn find_in(command: &str) -> Option<&'static App> {
    let lower = command.to_lowercase();
    APPS.iter()
        .flat_map(|app| app.aliases.iter().map(move |alias| (app, *alias)))
        .filter(|(_, alias)| crate::router::contains_word(&lower, alias))
        .max_by_key(|(_, alias)| alias.len())
        .map(|(app, _)| app)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_alias_wins() {
        assert_eq!(find_in("abra o visual studio code").unwrap().display, "vs code");
        assert_eq!(find_in("feche o Google Chrome").unwrap().display, "chrome");
        assert_eq!(
            find_in("digite no bloco de notas").unwrap().display,
            "bloco de notas"
        );
        assert_eq!(find_in("abra o opera gx").unwrap().display, "opera gx");
        assert!(find_in("abra o photoshop").is_none());
    }

    #[test]
    fn aliases_need_whole_words() {
        assert!(find_in("codificar algo").is_none());
        assert!(find("Steam").is_some());
    }

    #[test]
    fn only_plain_editors_are_focus_checked() {
        assert!(find("notepad").unwrap().checks_focus());
        assert!(find("calculadora").unwrap().checks_focus());
        assert!(!find("vscode").unwrap().checks_focus());
        assert!(!find("chrome").unwrap().checks_focus());
    }

    #[test]
    fn every_app_has_targets() {
        for app in APPS {
            let target = app.target();
            assert!(!target.launch.is_empty(), "{}", app.display);
            assert!(!target.process.is_empty(), "{}", app.display);
        }
    }
}
