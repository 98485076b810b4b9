//! User-facing strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Language of the texts the client generates itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ko,
    En,
}

impl Locale {
    /// Summary shown in place of an assistant reply when a turn fails.
    pub fn error_summary(self, error: &dyn fmt::Display) -> String {
        match self {
            Locale::Ko => format!("죄송합니다. 오류가 발생했습니다: {error}"),
            Locale::En => format!("Sorry, something went wrong: {error}"),
        }
    }

    /// Agent status while no turn is running.
    pub fn idle_agent_status(self) -> &'static str {
        match self {
            Locale::Ko => "4개 전문 에이전트 대기 중",
            Locale::En => "4 specialist agents standing by",
        }
    }

    /// Agent status while a turn is running.
    pub fn busy_agent_status(self, agent: &str) -> String {
        match self {
            Locale::Ko => format!("{agent} 에이전트 응답 중"),
            Locale::En => format!("{agent} agent is responding"),
        }
    }

    pub fn welcome(self) -> &'static str {
        match self {
            Locale::Ko => {
                "안녕하세요! 멀티 에이전트 챗봇입니다. 문서 검색, 코드 작성, 웹 검색, 일반 대화를 도와드릴게요."
            }
            Locale::En => {
                "Hello! I am a multi-agent assistant. I can search documents, write code, search the web, or just chat."
            }
        }
    }

    /// Marker appended to a reply cut short by the user.
    pub fn cancelled_suffix(self) -> &'static str {
        match self {
            Locale::Ko => " (중단됨)",
            Locale::En => " (stopped)",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Locale::Ko => "ko",
            Locale::En => "en",
        })
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ko" | "ko-kr" => Ok(Locale::Ko),
            "en" | "en-us" | "en-gb" => Ok(Locale::En),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}
