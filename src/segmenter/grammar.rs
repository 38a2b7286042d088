//! Guard table for split positions.
//!
//! Each rule pairs a condition on the text before the cut (`Tail`) with a
//! condition on the text after it (`Lead`). A cut is bad when any rule matches
//! both sides: it would separate a multi-token grammatical unit such as a
//! numeral and its counter, `~ㄹ 수 있다`, `~고 싶다` or an honorific stem.

use lazy_static::lazy_static;
use regex::Regex;

const HANGUL_BASE: u32 = 0xAC00;
const HANGUL_LAST: u32 = 0xD7A3;
/// Final consonant indices within a composed syllable
const FINAL_NIEUN: u32 = 4;
const FINAL_RIEUL: u32 = 8;

/// Final consonant (jongseong) index of a composed Hangul syllable, 0 when open.
pub fn final_consonant(c: char) -> Option<u32> {
    let code = c as u32;
    if (HANGUL_BASE..=HANGUL_LAST).contains(&code) {
        Some((code - HANGUL_BASE) % 28)
    } else {
        None
    }
}

enum Tail {
    Pattern(Regex),
    /// `before` ends with `suffix` and the syllable just ahead of it closes with one of `finals`
    Final {
        suffix: &'static str,
        finals: &'static [u32],
    },
    /// Last word is at most two characters and carries no particle
    ShortBareWord,
}

enum Lead {
    Pattern(Regex),
    Except { accept: Regex, reject: Regex },
    Any,
}

struct GuardRule {
    name: &'static str,
    tail: Tail,
    lead: Lead,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

fn pair(name: &'static str, tail: &str, lead: &str) -> GuardRule {
    GuardRule {
        name,
        tail: Tail::Pattern(re(tail)),
        lead: Lead::Pattern(re(lead)),
    }
}

fn after_final(name: &'static str, suffix: &'static str, finals: &'static [u32], lead: &str) -> GuardRule {
    GuardRule {
        name,
        tail: Tail::Final { suffix, finals },
        lead: Lead::Pattern(re(lead)),
    }
}

lazy_static! {
    static ref GUARD_RULES: Vec<GuardRule> = vec![
        pair(
            "numeral+counter",
            r"(한|두|세|네|다섯|여섯|일곱|여덟|아홉|열|한두|두세|서너|몇|몇몇|여러)$",
            r"^(개|톨|마리|명|장|권|병|잔|그릇|벌|켤레|대|채|척|자루|송이|알|방울|조각|점|가지)",
        ),
        pair("digit+unit", r"\d$", r"^[개분번초시일월년회명%]"),
        pair("ability 수 있다", r"\s수(도|밖에)?$", r"^(있|없)"),
        after_final("ability ~ㄹ 수", "", &[FINAL_RIEUL], r"^수\s?(도\s?)?(있|없)"),
        after_final("~ㄹ 때", "", &[FINAL_RIEUL], r"^때"),
        after_final(
            "dependent noun",
            "",
            &[FINAL_NIEUN, FINAL_RIEUL],
            r"^(것|줄|데|바|리|터|뿐|만큼|대로|듯|뻔)",
        ),
        after_final("~ㄹ 정도", "", &[FINAL_RIEUL], r"^정도"),
        pair("conjecture 것 같다", r"\s것$", r"^같"),
        pair("desire/progressive ~고", r"고$", r"^(싶|않|있|보|나)"),
        pair("negation ~지 않다", r"지$", r"^(않|못|말)"),
        pair("causative ~게 되다", r"게$", r"^(되|하|만들)"),
        pair("auxiliary ~아/어 주다", r"[아어해]$", r"^(주|줘|보|봐|내|버|드)"),
        pair("polite ending ~아요", r"[아어해지]$", r"^요"),
        pair("purpose ~도록", r"도록$", r"^(하|만들|해)"),
        pair("embedded question ~는지", r"[는을]지$", r"^(알|몰|봐|보|궁금|모르)"),
        after_final(
            "embedded question ~ㄴ지",
            "지",
            &[FINAL_NIEUN, FINAL_RIEUL],
            r"^(알|몰|봐|보|궁금|모르)",
        ),
        pair("conditional ~면 되다", r"면$", r"^(돼|되|안)"),
        pair("intention ~려고", r"려고$", r"^(하|해|했)"),
        pair(
            "negative adverb",
            r"(^|\s)(전혀|별로|도저히|절대|결코|도무지)$",
            r"^(없|못|안|아니)",
        ),
        pair("nominal ~기 때문", r"기$", r"^(때문|위해|전에|후에|위한|바라|싫|좋|쉬)"),
        pair("evaluation ~는 편", r"(\s|는)편$", r"^(이|인)"),
        pair("compound particle ~는", r"(에서|으로|에게|한테|부터|까지)$", r"^는"),
        pair("compound particle ~도", r"(마저|조차)$", r"^도"),
        pair("honorific 드리다", r"드$", r"^(릴|려|리)"),
        pair("honorific ~시다", r"(주|하|오|계)$", r"^(셔|시)"),
        pair(
            "sino-korean verb",
            r"(확인|선택|등록|수정|삭제|저장|검색|구매|결제|배송|주문|취소|문의|상담|추천|할인|적용|완료|진행|처리|사용|이용|참고|참조|설명|안내|소개|공유|연결|연락)$",
            r"^[해하]",
        ),
        pair("quotation ~라고", r"[라다냐]$", r"^고"),
        GuardRule {
            name: "determiner",
            tail: Tail::Pattern(re(r"(^|\s)[이그저새헌온]$")),
            lead: Lead::Any,
        },
        GuardRule {
            name: "short adverb",
            tail: Tail::Pattern(re(r"(^|\s)(잘|못|안|꼭|다|더|덜|막)$")),
            lead: Lead::Any,
        },
        GuardRule {
            name: "adnominal ~는/은",
            tail: Tail::Pattern(re(r"[는은]$")),
            lead: Lead::Except {
                accept: re(r"^[가-힣]"),
                reject: re(r"^(것|수|때|줄|곳|바|터|뿐|편|정도|만큼)"),
            },
        },
        GuardRule {
            name: "delimiter ~도/만",
            tail: Tail::Pattern(re(r"[도만]$")),
            lead: Lead::Except {
                accept: re(r"^[가-힣]"),
                reject: re(r"^[은는이가을를에서로와과의]"),
            },
        },
        GuardRule {
            name: "short bare word",
            tail: Tail::ShortBareWord,
            lead: Lead::Any,
        },
    ];

    static ref PARTICLE_END: Regex = re(r"[은는이가을를에서로]$");
}

impl Tail {
    fn matches(&self, before: &str) -> bool {
        match self {
            Tail::Pattern(pattern) => pattern.is_match(before),
            Tail::Final { suffix, finals } => {
                let Some(stem) = before.strip_suffix(suffix) else {
                    return false;
                };
                stem.chars()
                    .last()
                    .and_then(final_consonant)
                    .is_some_and(|f| finals.contains(&f))
            }
            Tail::ShortBareWord => {
                let last_word = before.split_whitespace().last().unwrap_or("");
                last_word.chars().count() <= 2 && !PARTICLE_END.is_match(last_word)
            }
        }
    }
}

impl Lead {
    fn matches(&self, after: &str) -> bool {
        match self {
            Lead::Pattern(pattern) => pattern.is_match(after),
            Lead::Except { accept, reject } => accept.is_match(after) && !reject.is_match(after),
            Lead::Any => true,
        }
    }
}

/// Name of the first rule that forbids cutting `text` before char index `pos`.
pub fn violated_rule(text: &[char], pos: usize) -> Option<&'static str> {
    if pos == 0 || pos >= text.len() {
        return None;
    }

    let before: String = text[..pos].iter().collect();
    let after: String = text[pos..].iter().collect();
    let before = before.trim_end();
    let after = after.trim_start();
    if before.is_empty() || after.is_empty() {
        return None;
    }

    GUARD_RULES
        .iter()
        .find(|rule| rule.tail.matches(before) && rule.lead.matches(after))
        .map(|rule| rule.name)
}

/// True when cutting before `pos` would split a grammatical unit.
pub fn is_bad_split_point(text: &[char], pos: usize) -> bool {
    violated_rule(text, pos).is_some()
}
