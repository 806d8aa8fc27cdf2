//! Turn processor: one user submission in, one assistant turn out.
//!
//! ```text
//! settings.validate() ──✗──▶ ConfigError (nothing recorded)
//!        │
//!  append user turn
//!        │
//!  role gate ──✗──▶ refusal text
//!        │
//!  ensure_handle ─▶ send ──▶ reply | "(No response generated)" | "Error: …"
//!        │
//!  append assistant turn
//! ```

use tracing::{debug, warn};

use crate::config::ChatSettings;
use crate::demo;
use crate::model::{ModelKey, ModelService, Reply};
use crate::role::{Gate, RoleDefinition};
use crate::session::{Session, Turn};
use crate::topic::matching_keywords;
use crate::{ConfigError, EMPTY_RESPONSE_PLACEHOLDER};

/// Process one chat message for `session` under `role`.
///
/// Configuration problems are returned before anything is appended.
/// Otherwise exactly one user turn and one assistant turn are appended and
/// the assistant turn is returned. Service failures become an assistant
/// turn starting with `"Error: "`.
pub async fn submit(
    session: &mut Session,
    role: &RoleDefinition,
    text: &str,
    settings: &ChatSettings,
    service: &dyn ModelService,
) -> Result<Turn, ConfigError> {
    settings.validate()?;

    session.append(Turn::user(text));

    let content = if role.accepts(text) {
        log_gate_hits(session, role, text);
        let key = ModelKey::new(&settings.api_key, settings.model, &role.instruction);
        match converse(session, &key, text, settings, service).await {
            Ok(reply) if reply.text.is_empty() => EMPTY_RESPONSE_PLACEHOLDER.to_string(),
            Ok(reply) => reply.text,
            Err(e) => {
                warn!("Session {}: model call failed: {e}", session.id());
                format!("Error: {e}")
            }
        }
    } else {
        debug!(
            "Session {}: {} gate rejected message ({} chars)",
            session.id(),
            role.id,
            text.len()
        );
        role.refusal()
    };

    let turn = Turn::assistant(content);
    session.append(turn.clone());
    Ok(turn)
}

async fn converse(
    session: &mut Session,
    key: &ModelKey,
    text: &str,
    settings: &ChatSettings,
    service: &dyn ModelService,
) -> Result<Reply, String> {
    if let Some(stale) = session.handle_key().filter(|k| *k != key) {
        service.release(stale);
    }
    let conversation =
        session.ensure_handle(key, |seed| service.start_conversation(key, seed))?;
    conversation.send(text, &settings.params).await
}

fn log_gate_hits(session: &Session, role: &RoleDefinition, text: &str) {
    if let Gate::Topic(topic) = role.gate {
        debug!(
            "Session {}: {} gate accepted ({topic}: {:?})",
            session.id(),
            role.id,
            matching_keywords(text, topic)
        );
    }
}

/// Widgets page echo chat. No model is involved.
pub fn submit_echo(
    session: &mut Session,
    text: &str,
    confidence: u32,
) -> Result<Turn, ConfigError> {
    demo::validate_confidence(confidence)?;
    session.append(Turn::user(text));
    let turn = Turn::assistant(demo::echo_reply(text, confidence));
    session.append(turn.clone());
    Ok(turn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationParams, ModelName};
    use crate::model::ContextMessage;
    use crate::model::testing::ScriptedService;
    use crate::role::Role;
    use crate::session::{Page, Speaker};

    fn settings() -> ChatSettings {
        ChatSettings::new("test-key", ModelName::Gemini20Flash)
            .with_allowed_models(Page::Roles.models())
    }

    fn role(r: Role) -> RoleDefinition {
        RoleDefinition::from(r)
    }

    #[tokio::test]
    async fn programming_question_reaches_code_generator() {
        let service = ScriptedService::replying(vec![Ok(Reply::text("Use `break`."))]);
        let mut session = Session::new(Page::Roles);

        let turn = submit(
            &mut session,
            &role(Role::CodeGenerator),
            "how do I fix this python loop error",
            &settings(),
            &service,
        )
        .await
        .unwrap();

        assert_eq!(turn, Turn::assistant("Use `break`."));
        assert_eq!(service.starts(), 1);
        assert_eq!(service.sends(), 1);
        assert_eq!(session.len(), 2);
        assert_eq!(session.history()[0], Turn::user("how do I fix this python loop error"));
    }

    #[tokio::test]
    async fn off_topic_message_gets_refusal_without_service_call() {
        let service = ScriptedService::default();
        let mut session = Session::new(Page::Roles);

        let turn = submit(
            &mut session,
            &role(Role::CodeGenerator),
            "what's the weather today",
            &settings(),
            &service,
        )
        .await
        .unwrap();

        assert_eq!(
            turn.content,
            "I am a code generator, please select appropriate option from the settings bar."
        );
        assert_eq!(service.starts(), 0);
        assert_eq!(service.sends(), 0);
        assert_eq!(session.len(), 2);
        assert!(session.handle().is_none());
    }

    #[tokio::test]
    async fn personal_assistant_answers_general_messages() {
        let service = ScriptedService::default();
        let mut session = Session::new(Page::Roles);

        let turn = submit(
            &mut session,
            &role(Role::PersonalAssistant),
            "remind me to call mom",
            &settings(),
            &service,
        )
        .await
        .unwrap();

        assert_eq!(turn.content, "ok");
        assert_eq!(service.sends(), 1);
    }

    #[tokio::test]
    async fn missing_api_key_records_nothing() {
        let service = ScriptedService::default();
        let mut session = Session::new(Page::Roles);
        let settings = ChatSettings::new("", ModelName::Gemini20Flash);

        let err = submit(
            &mut session,
            &role(Role::CodeGenerator),
            "python",
            &settings,
            &service,
        )
        .await
        .unwrap_err();

        assert_eq!(err, ConfigError::MissingApiKey);
        assert!(session.is_empty());
        assert_eq!(service.starts(), 0);
    }

    #[tokio::test]
    async fn out_of_range_params_record_nothing() {
        let service = ScriptedService::default();
        let mut session = Session::new(Page::Space);
        let settings = ChatSettings::new("k", ModelName::Gemini25Pro).with_params(GenerationParams {
            max_output_tokens: 8,
            ..Default::default()
        });

        let err = submit(
            &mut session,
            &RoleDefinition::space(None),
            "hello",
            &settings,
            &service,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConfigError::ParameterOutOfRange { name: "max_output_tokens", .. }));
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn service_failure_becomes_error_turn() {
        let service = ScriptedService::replying(vec![Err(
            "request failed: connection refused".to_string(),
        )]);
        let mut session = Session::new(Page::Roles);

        let turn = submit(
            &mut session,
            &role(Role::ScienceBuff),
            "explain gravity",
            &settings(),
            &service,
        )
        .await
        .unwrap();

        assert!(turn.content.starts_with("Error: "), "{}", turn.content);
        assert!(turn.content.contains("connection refused"));
        assert_eq!(session.len(), 2);
        assert_eq!(session.history()[0].role, Speaker::User);
        assert_eq!(session.history()[1].role, Speaker::Assistant);
        // A failed send leaves the handle usable with an unchanged context.
        assert_eq!(session.handle().map(|c| c.context().len()), Some(0));
    }

    #[tokio::test]
    async fn failed_conversation_start_becomes_error_turn() {
        let service = ScriptedService::failing_start("failed to build HTTP client");
        let mut session = Session::new(Page::Space);

        let turn = submit(
            &mut session,
            &RoleDefinition::space(None),
            "tell me about Jupiter",
            &ChatSettings::new("k", ModelName::Gemini15Pro),
            &service,
        )
        .await
        .unwrap();

        assert_eq!(turn.content, "Error: failed to build HTTP client");
        assert!(session.handle().is_none());
    }

    #[tokio::test]
    async fn empty_reply_uses_placeholder() {
        let service = ScriptedService::replying(vec![Ok(Reply::text(""))]);
        let mut session = Session::new(Page::Roles);

        let turn = submit(
            &mut session,
            &role(Role::StoryWriter),
            "write a story",
            &settings(),
            &service,
        )
        .await
        .unwrap();
        assert_eq!(turn.content, EMPTY_RESPONSE_PLACEHOLDER);
    }

    #[tokio::test]
    async fn handle_is_reused_and_seeded_with_rejected_turns() {
        let service = ScriptedService::default();
        let mut session = Session::new(Page::Roles);
        let coder = role(Role::CodeGenerator);

        // Rejected first: stays in history and ends up in the seed.
        submit(&mut session, &coder, "hello there", &settings(), &service)
            .await
            .unwrap();
        submit(&mut session, &coder, "debug this", &settings(), &service)
            .await
            .unwrap();
        submit(&mut session, &coder, "and the python part", &settings(), &service)
            .await
            .unwrap();

        assert_eq!(service.starts(), 1);
        assert_eq!(service.sends(), 2);
        assert_eq!(session.len(), 6);

        let calls = service.calls.lock().unwrap();
        let (key, seed) = &calls.started[0];
        assert_eq!(key.instruction, Role::CodeGenerator.instruction());
        assert_eq!(
            seed,
            &vec![
                ContextMessage::user("hello there"),
                ContextMessage::model(coder.refusal()),
            ]
        );
    }

    #[tokio::test]
    async fn switching_role_reseeds_conversation() {
        let service = ScriptedService::default();
        let mut session = Session::new(Page::Roles);

        submit(&mut session, &role(Role::CodeGenerator), "code", &settings(), &service)
            .await
            .unwrap();
        submit(&mut session, &role(Role::ScienceBuff), "physics", &settings(), &service)
            .await
            .unwrap();

        assert_eq!(service.starts(), 2);
        let calls = service.calls.lock().unwrap();
        assert_eq!(calls.started[1].1.len(), 2);
        assert_eq!(calls.started[1].0.instruction, Role::ScienceBuff.instruction());
        assert_eq!(calls.released.len(), 1);
        assert_eq!(calls.released[0].instruction, Role::CodeGenerator.instruction());
    }

    #[tokio::test]
    async fn each_reseed_releases_only_the_replaced_key() {
        let service = ScriptedService::default();
        let mut session = Session::new(Page::Space);

        for i in 0..5 {
            let role = RoleDefinition::space(Some(&format!("Only talk about moon {i}.")));
            submit(&mut session, &role, "tell me more", &settings(), &service)
                .await
                .unwrap();
        }

        assert_eq!(service.starts(), 5);
        let calls = service.calls.lock().unwrap();
        let released: Vec<_> = calls.released.iter().map(|k| k.instruction.as_str()).collect();
        assert_eq!(
            released,
            (0..4)
                .map(|i| format!("Only talk about moon {i}."))
                .collect::<Vec<_>>()
        );
        assert_eq!(
            session.handle_key().map(|k| k.instruction.as_str()),
            Some("Only talk about moon 4.")
        );
    }

    #[tokio::test]
    async fn sampling_params_do_not_reseed() {
        let service = ScriptedService::default();
        let mut session = Session::new(Page::Roles);
        let coder = role(Role::CodeGenerator);

        submit(&mut session, &coder, "code", &settings(), &service)
            .await
            .unwrap();
        let hotter = settings().with_params(GenerationParams {
            temperature: 1.5,
            ..Default::default()
        });
        submit(&mut session, &coder, "more code", &hotter, &service)
            .await
            .unwrap();

        assert_eq!(service.starts(), 1);
        assert_eq!(service.sends(), 2);
        assert!(service.calls.lock().unwrap().released.is_empty());
    }

    #[test]
    fn echo_appends_user_and_reply() {
        let mut session = Session::new(Page::Widgets);
        let turn = submit_echo(&mut session, "hi", 70).unwrap();
        assert_eq!(
            turn.content,
            "You said: **hi**. By the way, confidence level is set to 70%."
        );
        assert_eq!(session.len(), 3);
        assert!(submit_echo(&mut session, "hi", 71).is_err());
        assert_eq!(session.len(), 3);
    }
}
