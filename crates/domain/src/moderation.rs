//! 内容审核门
//!
//! 所有用户生成的文本（点赞附言、聊天消息、资料、群组文案）在落库之前
//! 都要经过这里。检测本身是纯同步函数，违规日志由应用层异步补写。
//!
//! 禁用词表是进程级全局状态：启动时加载一次，之后的增删通过整表重建
//! 加原子替换完成，并发中的验证要么看到旧表、要么看到新表，不会看到
//! 半更新状态。

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 垃圾内容加权评分的判定阈值
pub const SPAM_SCORE_THRESHOLD: f32 = 0.7;
/// 连续重复字符的判定长度
pub const CHAR_REPEAT_LIMIT: usize = 5;
/// 表情符号密度的判定阈值
pub const EMOJI_DENSITY_THRESHOLD: f32 = 0.5;

/// 文本所处的使用场景，影响部分启发式的严重级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationContext {
    Profile,
    Chat,
    Group,
    Review,
}

impl fmt::Display for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Profile => "profile",
            Self::Chat => "chat",
            Self::Group => "group",
            Self::Review => "review",
        };
        f.write_str(name)
    }
}

/// 违规严重级别，驱动放行/脱敏/拦截三种处理。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(name)
    }
}

/// 各启发式的违规种类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    BannedTerm,
    ContactInfo,
    Spam,
    CharRepetition,
    EmojiFlood,
}

/// 单条违规记录。
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub detail: String,
}

/// 验证结果：各启发式独立运行，问题逐条累加。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// 问题列表为空即有效。
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// 总体严重级别取所有触发项的最大值。
    pub fn severity(&self) -> Option<Severity> {
        self.issues.iter().map(|issue| issue.severity).max()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.issues.iter().map(|issue| issue.detail.clone()).collect()
    }
}

/// `filter_text` 的处理结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterAction {
    /// 原样放行
    Safe,
    /// 脱敏后放行
    Warning,
    /// 整体拦截
    Blocked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilteredText {
    pub action: FilterAction,
    pub text: String,
}

/// 禁用词索引：词表加上一次性构建的多模式自动机。
///
/// 不可变，更新通过重建新索引后整体替换完成。
struct BannedIndex {
    terms: Vec<String>,
    automaton: Option<AhoCorasick>,
}

impl BannedIndex {
    fn build(mut terms: Vec<String>) -> Self {
        terms.retain(|term| !term.trim().is_empty());
        for term in &mut terms {
            *term = term.trim().to_lowercase();
        }
        terms.sort();
        terms.dedup();

        let automaton = if terms.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .ascii_case_insensitive(true)
                    .build(&terms)
                    .expect("banned term automaton"),
            )
        };

        Self { terms, automaton }
    }
}

const DEFAULT_BANNED_TERMS: &[&str] = &[
    "씨발", "시발", "병신", "창녀", "자살", "도박", "카지노", "토토", "fuck", "bitch",
    "viagra",
];

static BANNED_INDEX: Lazy<RwLock<Arc<BannedIndex>>> = Lazy::new(|| {
    let terms = DEFAULT_BANNED_TERMS.iter().map(|s| (*s).to_owned()).collect();
    RwLock::new(Arc::new(BannedIndex::build(terms)))
});

fn current_index() -> Arc<BannedIndex> {
    BANNED_INDEX
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn swap_index(index: BannedIndex) {
    let mut guard = BANNED_INDEX.write().unwrap_or_else(PoisonError::into_inner);
    *guard = Arc::new(index);
}

/// 整表替换禁用词。
pub fn set_banned_terms(terms: Vec<String>) {
    swap_index(BannedIndex::build(terms));
}

/// 追加一个禁用词，触发整表重建。
pub fn add_banned_term(term: impl Into<String>) {
    let mut terms = current_index().terms.clone();
    terms.push(term.into());
    swap_index(BannedIndex::build(terms));
}

/// 移除一个禁用词，触发整表重建。
pub fn remove_banned_term(term: &str) {
    let needle = term.trim().to_lowercase();
    let mut terms = current_index().terms.clone();
    terms.retain(|t| *t != needle);
    swap_index(BannedIndex::build(terms));
}

/// 当前生效的禁用词表。
pub fn banned_terms() -> Vec<String> {
    current_index().terms.clone()
}

// 联系方式泄露模式：手机号（含韩国 01X 格式）、邮箱、社交账号、链接
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\b01[016789][-.\s]?\d{3,4}[-.\s]?\d{4}\b)|(\+\d{1,3}[-.\s]?\d{1,4}[-.\s]?\d{3,4}[-.\s]?\d{3,4})")
        .expect("phone pattern")
});

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern")
});

// 独立出现的 @handle；邮箱里的 @ 前面有本地部分，不会误中
static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|\s)@[A-Za-z0-9_.]{3,}").expect("handle pattern"));

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bhttps?://\S+|\bwww\.\S+|\b[a-z0-9][a-z0-9-]*\.(com|net|org|io|kr|co|me|ly|gg|xyz)/\S+",
    )
    .expect("url pattern")
});

const SPAM_KEYWORDS: &[&str] = &[
    "무료", "클릭", "광고", "쿠폰", "이벤트", "상담", "대출", "수익", "free", "click",
    "promo", "casino", "jackpot",
];

/// 大小写与空白归一化：检测用，脱敏用原文偏移。
fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn check_banned_terms(text: &str, issues: &mut Vec<ValidationIssue>) {
    let index = current_index();
    let Some(automaton) = &index.automaton else {
        return;
    };
    let normalized = normalize(text);
    let mut matched: Vec<&str> = automaton
        .find_iter(&normalized)
        .map(|m| index.terms[m.pattern().as_usize()].as_str())
        .collect();
    matched.sort_unstable();
    matched.dedup();
    if !matched.is_empty() {
        issues.push(ValidationIssue {
            kind: IssueKind::BannedTerm,
            severity: Severity::High,
            detail: format!("banned terms: {}", matched.join(", ")),
        });
    }
}

fn check_contact_info(text: &str, context: ValidationContext, issues: &mut Vec<ValidationIssue>) {
    let mut kinds = Vec::new();
    if PHONE_RE.is_match(text) {
        kinds.push("phone");
    }
    if EMAIL_RE.is_match(text) {
        kinds.push("email");
    } else if HANDLE_RE.is_match(text) {
        kinds.push("handle");
    }
    if URL_RE.is_match(text) {
        kinds.push("url");
    }
    if kinds.is_empty() {
        return;
    }

    // 资料页沉淀时间长、曝光面广，联系方式泄露按 HIGH 处理
    let severity = match context {
        ValidationContext::Profile => Severity::High,
        _ => Severity::Medium,
    };
    issues.push(ValidationIssue {
        kind: IssueKind::ContactInfo,
        severity,
        detail: format!("contact info leak: {}", kinds.join(", ")),
    });
}

fn check_spam_score(text: &str, issues: &mut Vec<ValidationIssue>) {
    let normalized = normalize(text);
    let mut score = 0.0f32;

    for keyword in SPAM_KEYWORDS {
        if normalized.contains(keyword) {
            score += 0.25;
        }
    }

    score += URL_RE.find_iter(text).count() as f32 * 0.3;

    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 10 {
        let upper = letters.iter().filter(|c| c.is_uppercase()).count();
        if upper as f32 / letters.len() as f32 > 0.5 {
            score += 0.3;
        }
    }

    if score >= SPAM_SCORE_THRESHOLD {
        issues.push(ValidationIssue {
            kind: IssueKind::Spam,
            severity: Severity::Medium,
            detail: format!("spam score {score:.2}"),
        });
    }
}

fn check_char_repetition(text: &str, issues: &mut Vec<ValidationIssue>) {
    let mut run = 0usize;
    let mut previous: Option<char> = None;
    for c in text.chars() {
        if Some(c) == previous {
            run += 1;
            if run >= CHAR_REPEAT_LIMIT {
                issues.push(ValidationIssue {
                    kind: IssueKind::CharRepetition,
                    severity: Severity::Low,
                    detail: format!("character '{c}' repeated {CHAR_REPEAT_LIMIT}+ times"),
                });
                return;
            }
        } else {
            previous = Some(c);
            run = 1;
        }
    }
}

fn is_emoji(c: char) -> bool {
    matches!(
        u32::from(c),
        0x1F300..=0x1F5FF
            | 0x1F600..=0x1F64F
            | 0x1F680..=0x1F6FF
            | 0x1F900..=0x1F9FF
            | 0x1FA70..=0x1FAFF
            | 0x2600..=0x26FF
            | 0x2700..=0x27BF
            | 0x1F1E6..=0x1F1FF
    )
}

fn check_emoji_density(text: &str, issues: &mut Vec<ValidationIssue>) {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return;
    }
    let emoji = text.chars().filter(|c| is_emoji(*c)).count();
    let density = emoji as f32 / total as f32;
    if density > EMOJI_DENSITY_THRESHOLD {
        issues.push(ValidationIssue {
            kind: IssueKind::EmojiFlood,
            severity: Severity::Low,
            detail: format!("emoji density {density:.2}"),
        });
    }
}

/// 运行全部启发式并汇总结果。纯函数，无副作用。
pub fn validate(text: &str, context: ValidationContext) -> ValidationReport {
    let mut issues = Vec::new();
    check_banned_terms(text, &mut issues);
    check_contact_info(text, context, &mut issues);
    check_spam_score(text, &mut issues);
    check_char_repetition(text, &mut issues);
    check_emoji_density(text, &mut issues);
    ValidationReport { issues }
}

/// 把触发模式的文本区间替换为等长的 `*`。
///
/// 按字节区间收集、按字符数填充，区间在原文上定位，避免归一化
/// 带来的偏移错位。
fn mask_spans(text: &str) -> String {
    let mut spans: Vec<(usize, usize)> = Vec::new();

    let index = current_index();
    if let Some(automaton) = &index.automaton {
        for m in automaton.find_iter(text) {
            spans.push((m.start(), m.end()));
        }
    }
    for m in PHONE_RE.find_iter(text) {
        spans.push((m.start(), m.end()));
    }
    for m in EMAIL_RE.find_iter(text) {
        spans.push((m.start(), m.end()));
    }

    if spans.is_empty() {
        return text.to_owned();
    }
    spans.sort_unstable();

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for (start, end) in spans {
        if start < cursor {
            continue; // 重叠区间已覆盖
        }
        out.push_str(&text[cursor..start]);
        let width = text[start..end].chars().count();
        out.extend(std::iter::repeat('*').take(width));
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// 根据严重级别决定放行、脱敏或拦截。
pub fn filter_text(text: &str, context: ValidationContext) -> FilteredText {
    let report = validate(text, context);
    match report.severity() {
        Some(Severity::High) => FilteredText {
            action: FilterAction::Blocked,
            text: String::new(),
        },
        Some(Severity::Medium) => FilteredText {
            action: FilterAction::Warning,
            text: mask_spans(text),
        },
        _ => FilteredText {
            action: FilterAction::Safe,
            text: text.to_owned(),
        },
    }
}
