pub mod context;
pub mod emotion;
pub mod prompts;
pub mod reply;
pub mod safety;
pub mod scene;
pub mod session;
pub mod vocabulary;

pub use context::{ConversationContext, Role, Turn};
pub use emotion::{Action, Dial, Dials, EmotionConfig, EmotionKind, EmotionState};
pub use reply::ChatReply;
pub use scene::SceneTelemetry;
pub use session::{DialogueSession, SessionRegistry, SessionStatus, TurnOutcome, TurnStatus};
pub use vocabulary::VocabularyConstraints;
