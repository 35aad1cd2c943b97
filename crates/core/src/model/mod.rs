mod document;
mod ids;
mod mode;
mod question;
mod session;
mod test_instance;
mod text;
mod weak_topics;

pub use document::{DocumentKind, DocumentOutline, SyllabusScope, SyllabusUnit};
pub use ids::{ParseIdError, SessionId};
pub use mode::{Mode, ModeError};
pub use question::{Choice, ChoiceError, ChoiceToken, Question, QuestionError, QuestionView};
pub use session::{Session, SessionSnapshot, TestCompletion, TestProgress, TestState};
pub use test_instance::{
    AnswerOutcome, PASS_THRESHOLD, QUESTIONS_PER_TEST, TestError, TestInstance, TestScore,
};
pub use weak_topics::{WEAK_TOPIC_THRESHOLD, WeakTopicTracker};
