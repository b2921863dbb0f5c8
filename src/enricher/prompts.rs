use std::sync::LazyLock;

use regex::Regex;

use crate::extractor::cleaner::collapse_whitespace;

/// One LLM call of the enrichment procedure.
#[derive(Debug, Clone, Copy)]
pub struct Task {
    pub name: &'static str,
    pub system: &'static str,
    /// Label put in front of the article text in the user message.
    pub label: &'static str,
    pub max_tokens: u32,
    pub temperature: f32,
    /// The cleaned answer must be longer than this many characters.
    pub min_chars: usize,
}

impl Task {
    pub fn user_prompt(&self, text: &str) -> String {
        format!("{}\n\n{}", self.label, text)
    }
}

pub const SUMMARY_ZH: Task = Task {
    name: "summary_zh",
    system: "你是一个专业的新闻编辑，请为以下新闻内容生成一个简洁、准确的中文摘要。\n\n\
要求：\n\
1. 摘要不超过150字\n\
2. 只保留新闻的核心信息和关键事实\n\
3. 使用客观、准确的语言\n\
4. 避免主观评价和推测\n\n\
请直接返回摘要内容，不要添加任何额外的说明或格式。",
    label: "新闻内容：",
    max_tokens: 400,
    temperature: 0.3,
    min_chars: 20,
};

pub const SUMMARY_EN: Task = Task {
    name: "summary_en",
    system: "You are a professional news editor. Write a concise and accurate English summary \
of the following news content.\n\n\
Requirements:\n\
1. At most 150 words\n\
2. Core facts only\n\
3. Objective and accurate language\n\
4. No subjective evaluation or speculation\n\n\
Return the summary directly, without any additional explanation or formatting.",
    label: "News content:",
    max_tokens: 400,
    temperature: 0.3,
    min_chars: 20,
};

pub const DETAILED_ZH: Task = Task {
    name: "detailed_summary_zh",
    system: "你是一个资深的新闻分析编辑，请为以下新闻内容撰写一份结构化的中文详细摘要。\n\n\
要求：\n\
1. 分为\"背景\"、\"进展\"、\"影响\"三个部分\n\
2. 每部分两到三句话\n\
3. 忠于原文，不要编造信息\n\n\
请直接返回摘要内容，不要添加任何额外的说明。",
    label: "新闻内容：",
    max_tokens: 800,
    temperature: 0.3,
    min_chars: 20,
};

pub const TRANSLATION_ZH: Task = Task {
    name: "translation_zh",
    system: "你是一个专业的翻译专家，请将以下新闻内容翻译成流畅的中文。\n\n\
要求：\n\
1. 保持原文的意思和语气\n\
2. 使用准确、流畅的中文表达\n\
3. 保留重要的专有名词和数字\n\n\
请直接返回翻译结果，不要添加任何额外的说明或格式。",
    label: "原文：",
    max_tokens: 2000,
    temperature: 0.2,
    min_chars: 50,
};

pub const TITLE_ZH: Task = Task {
    name: "translated_title",
    system: "你是一个专业的新闻翻译，请将以下新闻标题翻译成简洁的中文标题。\
请只返回翻译后的标题。",
    label: "标题：",
    max_tokens: 100,
    temperature: 0.2,
    min_chars: 0,
};

pub const QUALITY: Task = Task {
    name: "quality_score",
    system: "你是一个新闻质量评估专家，请从信息完整性、语言表达、新闻价值、客观性和时效性\
五个维度综合评估以下新闻内容，给出一个0-10分的总体质量评分，保留一位小数。\n\n\
请直接返回数字评分，不要添加任何其他内容。",
    label: "新闻内容：",
    max_tokens: 10,
    temperature: 0.0,
    min_chars: 0,
};

/// Answer preambles models like to add, checked in order.
const ANSWER_PREFIXES: [&str; 12] = [
    "以下是摘要：",
    "以下是翻译：",
    "摘要：",
    "总结：",
    "概要：",
    "翻译：",
    "Here's the summary:",
    "Here is the summary:",
    "The summary is:",
    "Summary:",
    "Abstract:",
    "Translation:",
];

static LANGUAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[\[【]\s*(?i:en|zh|cn|english|chinese|中文|英文)\s*[\]】]\s*")
        .expect("language marker regex compiles")
});

static SCORE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("score regex compiles"));

/// Strip answer preambles and language markers, then collapse whitespace.
pub fn strip_answer_prefix(text: &str) -> String {
    let mut rest = text.trim();
    loop {
        let before = rest.len();

        if let Some(m) = LANGUAGE_MARKER.find(rest) {
            rest = rest[m.end()..].trim_start();
        }
        for prefix in ANSWER_PREFIXES {
            if let Some(stripped) = strip_prefix_ignore_ascii_case(rest, prefix) {
                rest = stripped.trim_start();
            }
        }
        // Full-width and ASCII colons are interchangeable in model output.
        for prefix in ["摘要:", "总结:", "概要:", "翻译:"] {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                rest = stripped.trim_start();
            }
        }

        if rest.len() == before {
            break;
        }
    }
    collapse_whitespace(rest)
}

fn strip_prefix_ignore_ascii_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &text[prefix.len()..])
}

/// Clean an answer and enforce the task's minimum length.
pub fn accept(task: &Task, raw: &str) -> Option<String> {
    let cleaned = strip_answer_prefix(raw);
    (!cleaned.is_empty() && cleaned.chars().count() > task.min_chars).then_some(cleaned)
}

/// First number in the answer, clamped to 0..=10 and rounded to one decimal.
/// Unparsable answers score 0.
pub fn parse_quality(text: &str) -> f64 {
    SCORE_REGEX
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|score| (score.clamp(0.0, 10.0) * 10.0).round() / 10.0)
        .unwrap_or(0.0)
}
