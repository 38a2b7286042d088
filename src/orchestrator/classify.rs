//! Классификация ошибок заданий
//!
//! Типизированные варианты `AppError` сопоставляются напрямую, остальное
//! распознается по ключевым словам в тексте ошибки. Здесь же короткие коды
//! для колонки статуса и развернутые сообщения для журнала.

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::AppError;

/// Класс ошибки, определяющий политику повтора
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    QuotaExceeded,
    PermissionDenied,
    ServerOverloaded,
    ServerError,
    ValidationSkip,
    Unclassified,
}

const OVERLOAD_TOKENS: [&str; 5] = ["503", "overloaded", "unavailable", "timeout", "timed out"];
const QUOTA_TOKENS: [&str; 3] = ["429", "quota", "resource_exhausted"];
const PERMISSION_TOKENS: [&str; 7] = [
    "permission denied",
    "permission_denied",
    "forbidden",
    "403",
    "suspended",
    "invalid api key",
    "unauthorized",
];

const ENCODING_TOKENS: [&str; 9] = [
    "ffmpeg",
    "encoder",
    "encoding",
    "codec",
    "moviepy",
    "write_videofile",
    "libx264",
    "h264",
    "aac",
];

lazy_static! {
    static ref HTTP_CODE: Regex = Regex::new(r"(?:HTTP|http|status|Status)[\s:_-]*(\d{3})").unwrap();
    static ref BRACKET_CODE: Regex = Regex::new(r"\[(\d{3})\]").unwrap();
    static ref ACTUAL_SECS: Regex = Regex::new(r"(\d+(?:\.\d+)?)초").unwrap();
}

fn contains_any(haystack: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| haystack.contains(t))
}

pub fn classify(err: &AppError) -> ErrorClass {
    match err {
        AppError::QuotaExceeded(_) => ErrorClass::QuotaExceeded,
        AppError::PermissionDenied(_) => ErrorClass::PermissionDenied,
        AppError::ServerOverloaded(_) | AppError::Timeout(_) => ErrorClass::ServerOverloaded,
        AppError::ServerError(_) => ErrorClass::ServerError,
        AppError::ValidationSkip(_) => ErrorClass::ValidationSkip,
        // Исчерпанный пул и отмена не повторяются
        AppError::Credential(_)
        | AppError::Cancelled
        | AppError::Configuration(_)
        | AppError::AlreadyRunning(_)
        | AppError::Fit(_) => ErrorClass::Unclassified,
        other => classify_message(&other.to_string()),
    }
}

/// Классификация по тексту ошибки
pub fn classify_message(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();

    if contains_any(&lower, &OVERLOAD_TOKENS) {
        return ErrorClass::ServerOverloaded;
    }
    if contains_any(&lower, &QUOTA_TOKENS) {
        return ErrorClass::QuotaExceeded;
    }
    if lower.contains("500") || lower.contains("internal server error") {
        return ErrorClass::ServerError;
    }
    if contains_any(&lower, &PERMISSION_TOKENS) {
        return ErrorClass::PermissionDenied;
    }
    ErrorClass::Unclassified
}

/// Короткий (до 10 символов) код ошибки для списка заданий
pub fn short_code(err: &AppError) -> String {
    match err {
        AppError::ValidationSkip(code) => code.clone(),
        AppError::Credential(_) | AppError::QuotaExceeded(_) => "API한도초과".to_string(),
        AppError::PermissionDenied(_) => "API권한없음".to_string(),
        other => short_code_for_message(&other.to_string()).to_string(),
    }
}

pub fn short_code_for_message(message: &str) -> &'static str {
    let lower = message.to_lowercase();

    if contains_any(&lower, &ENCODING_TOKENS) {
        return "인코딩오류";
    }
    if lower.contains("video")
        && contains_any(&lower, &["write", "export", "render", "frame", "clip", "output"])
    {
        return "영상처리오류";
    }
    if lower.contains("subtitle") || lower.contains("ocr") {
        return "자막처리오류";
    }
    if message.contains("너무짧음") || message.contains("영상 너무 짧음") {
        return "10초미만";
    }
    if message.contains("길이초과") || message.contains("영상 길이 초과") {
        return "39초초과";
    }
    if lower.contains("tts length") && lower.contains("exceeds") {
        return "영상짧음";
    }
    if lower.contains("tts") || lower.contains("audio") {
        return "TTS오류";
    }
    if lower.contains("download") {
        return "다운로드오류";
    }
    if lower.contains("api") && (lower.contains("quota") || lower.contains("limit")) {
        return "API한도초과";
    }
    if lower.contains("permission") || lower.contains("denied") {
        return "API권한없음";
    }
    if lower.contains("rate limit") {
        return "API제한초과";
    }

    if contains_any(&lower, &["timeout", "timed out"])
        || message.contains("시간 초과")
        || message.contains("타임아웃")
    {
        return if lower.contains("download") || message.contains("다운로드") || lower.contains("read operation") {
            "다운로드실패"
        } else if lower.contains("analysis") || message.contains("분석") {
            "분석시간초과"
        } else if lower.contains("connect") || message.contains("연결") {
            "연결시간초과"
        } else if lower.contains("request") || message.contains("요청") || message.contains("네트워크") {
            "네트워크불안정"
        } else {
            "응답시간초과"
        };
    }

    if lower.contains("network") || lower.contains("connection") || message.contains("네트워크") {
        return if lower.contains("reset") || message.contains("끊김") {
            "연결끊김"
        } else if lower.contains("refused") || message.contains("거부") {
            "연결거부됨"
        } else {
            "네트워크오류"
        };
    }

    if message.contains("연결") {
        "연결오류"
    } else if lower.contains("not found") {
        "리소스없음"
    } else if lower.contains("validation") {
        "입력값오류"
    } else if lower.contains("unauthorized") {
        "인증실패"
    } else if lower.contains("bad request") {
        "잘못된요청"
    } else if lower.contains("internal server") {
        "서버오류"
    } else if lower.contains("overloaded") {
        "서버과부하"
    } else {
        "알수없음"
    }
}

/// Развернутое сообщение об ошибке для журнала
pub fn translate_message(message: &str) -> String {
    let lower = message.to_lowercase();

    if lower.contains("failed to read") && lower.contains("frame") {
        return "비디오 프레임 읽기 오류 - 원본 파일 접근 불가".to_string();
    }
    let video_output = lower.contains("video")
        && contains_any(&lower, &["write", "export", "render", "output"]);
    if contains_any(&lower, &ENCODING_TOKENS) || video_output {
        return "인코딩 오류 - 영상 합성 중 문제 발생".to_string();
    }
    if message.contains("429") || message.contains("RESOURCE_EXHAUSTED") || lower.contains("quota") {
        return "API 일일 할당량 초과 - 다른 API 키로 자동 전환 중".to_string();
    }
    if (message.contains("500") || message.contains("503") || lower.contains("overloaded"))
        && contains_any(&lower, &["api", "request", "response", "http"])
    {
        return "API 서버 과부하 - 잠시 후 재시도".to_string();
    }
    if message.contains("401")
        || message.contains("403")
        || message.contains("PERMISSION_DENIED")
        || message.contains("Unauthorized")
    {
        return "API 인증 오류 - API 키 확인 필요".to_string();
    }
    if message.contains("400") || message.contains("Bad request") || lower.contains("validation error") {
        return "잘못된 요청 형식 - 설정 확인 필요".to_string();
    }
    if message.contains("404") || message.contains("Not found") {
        return "리소스를 찾을 수 없음".to_string();
    }
    if lower.contains("timeout") || lower.contains("timed out") {
        return "요청 시간 초과 - 네트워크 확인 필요".to_string();
    }
    if lower.contains("network") || lower.contains("connection") {
        return "네트워크 연결 오류 - 인터넷 연결 확인 필요".to_string();
    }
    if message.contains("너무짧음") {
        return match actual_seconds(message) {
            Some(secs) => format!("영상 {:.0}초 - 10초 이상 필요", secs),
            None => "영상이 10초 미만 - 다음 영상으로 건너뜀".to_string(),
        };
    }
    if message.contains("길이초과") {
        return match actual_seconds(message) {
            Some(secs) => format!("영상 {:.0}초 - 39초 이하만 처리 가능", secs),
            None => "영상이 39초 초과 - 다음 영상으로 건너뜀".to_string(),
        };
    }
    if message.contains("TTS length") && message.contains("exceeds") {
        return "영상이 너무 짧음 - TTS가 영상보다 김. 더 긴 영상 필요".to_string();
    }
    if lower.contains("rate limit") {
        return "API 요청 제한 초과".to_string();
    }

    let api_related = contains_any(&lower, &["api", "request", "response", "endpoint"]);
    let code = HTTP_CODE
        .captures(message)
        .or_else(|| BRACKET_CODE.captures(message))
        .map(|caps| caps[1].to_string())
        .filter(|code| code.starts_with('4') || code.starts_with('5'));
    if let Some(code) = code {
        return if api_related {
            format!("API 오류 (코드 {}) - 재시도 중", code)
        } else {
            format!("처리 오류 (코드 {}) - 재시도 중", code)
        };
    }

    let chars: Vec<char> = message.chars().collect();
    if chars.len() > 50 {
        format!("처리 오류 - {}...", chars[..50].iter().collect::<String>())
    } else {
        format!("처리 오류 - {}", message)
    }
}

fn actual_seconds(message: &str) -> Option<f64> {
    ACTUAL_SECS
        .captures(message)
        .and_then(|caps| caps[1].parse().ok())
}
