use crate::ai::context::Turn;
use crate::ai::emotion::{Action, EmotionKind, EmotionRules, EmotionState};
use crate::ai::vocabulary::VocabularyConstraints;
use std::fmt::Write;

pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个对话机器人。在对话中,你需要:
1. 只使用指定的词汇表达
2. 表现出适当的情绪
3. 保持对话的自然性和连贯性
4. 回答要简短精炼";

/// Marker rendered in place of an empty history block.
pub const EMPTY_HISTORY: &str = "（无）";

const EXAMPLE_REPLY: &str = r#"{
    "text": "你好，很高兴见到你",
    "emotion_type": "高兴",
    "action": "微笑",
    "speech_speed": 7,
    "volume": 6,
    "pitch": 7
}"#;

/// Everything a turn prompt is rendered from. Rendering is a pure function of
/// these inputs.
pub struct TurnPrompt<'a> {
    pub user_input: &'a str,
    pub history: &'a [Turn],
    pub emotion: &'a EmotionState,
    pub vocabulary: &'a VocabularyConstraints,
    pub rules: Option<&'a EmotionRules>,
}

fn joined<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("、")
}

impl TurnPrompt<'_> {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let dials = self.emotion.dials();

        out.push_str("你是一个对话机器人。请按照以下要求回复:\n\n");
        out.push_str("1. 输出格式必须是合法的JSON，包含以下字段:\n");
        out.push_str("   - text: 回复的文本内容\n");
        let _ = writeln!(
            out,
            "   - emotion_type: 情感类型，必须是以下之一：{}",
            joined(EmotionKind::ALL.iter().map(|k| k.label()))
        );
        let _ = writeln!(
            out,
            "   - action: 动作，必须是以下之一：{}",
            joined(Action::ALL.iter().map(|a| a.label()))
        );
        out.push_str("   - speech_speed: 语速，1-10的整数\n");
        out.push_str("   - volume: 音量，1-10的整数\n");
        out.push_str("   - pitch: 音调，1-10的整数\n\n");

        out.push_str("2. 当前情感状态:\n");
        let _ = writeln!(out, "   - 类型: {}", self.emotion.kind());
        let _ = writeln!(out, "   - 语速: {}", dials.speech_speed);
        let _ = writeln!(out, "   - 音量: {}", dials.volume);
        let _ = writeln!(out, "   - 音调: {}", dials.pitch);
        if let Some(rules) = self.rules {
            let next = rules.transitions_from(self.emotion.kind());
            if !next.is_empty() {
                let _ = writeln!(out, "   - 建议的情感转换: {}", joined(next.iter().map(|k| k.label())));
            }
            let triggered = rules.triggered_by(self.user_input);
            if !triggered.is_empty() {
                let _ = writeln!(out, "   - 输入可能触发的情感: {}", joined(triggered.iter().map(|k| k.label())));
            }
        }
        out.push('\n');

        out.push_str("3. 对话历史:\n");
        if self.history.is_empty() {
            out.push_str(EMPTY_HISTORY);
            out.push('\n');
        } else {
            for turn in self.history {
                let _ = writeln!(out, "{}: {}", turn.role.prompt_prefix(), turn.text);
            }
        }
        out.push('\n');

        if !self.vocabulary.is_empty() {
            out.push_str("4. 词汇约束(尽量只使用以下词汇表达):\n");
            for (kind, words) in &self.vocabulary.emotions {
                if !words.is_empty() {
                    let _ = writeln!(out, "   - {}: {}", kind, joined(words));
                }
            }
            if !self.vocabulary.actions.is_empty() {
                let _ = writeln!(out, "   - 动作: {}", joined(&self.vocabulary.actions));
            }
            for (category, words) in &self.vocabulary.responses {
                if !words.is_empty() {
                    let _ = writeln!(out, "   - {}: {}", category, joined(words));
                }
            }
            out.push('\n');
        }

        out.push_str("5. 用户输入:\n");
        out.push_str(self.user_input);
        out.push_str("\n\n");

        out.push_str("请确保你的回复是一个合法的JSON字符串，包含所有必需字段。例如:\n");
        out.push_str(EXAMPLE_REPLY);
        out.push_str("\n\n请根据上述要求生成回复:");
        out
    }
}
