use super::markdown::render_markdown;
use super::*;
use crate::types::{AgentEvent, HostMessage, LogLevel, WebviewCommand};
use serde_json::json;

fn start(id: &str) -> AgentEvent {
    AgentEvent::MarkdownStart {
        stream_id: id.to_string(),
    }
}

fn chunk(id: &str, text: &str) -> AgentEvent {
    AgentEvent::MarkdownChunk {
        stream_id: id.to_string(),
        chunk: text.to_string(),
    }
}

fn end(id: &str) -> AgentEvent {
    AgentEvent::MarkdownEnd {
        stream_id: id.to_string(),
    }
}

fn roles(state: &WebviewState) -> Vec<Role> {
    state.messages().map(|m| m.role).collect()
}

#[test]
fn test_interleaved_streams_render_their_own_concatenation() {
    let mut state = WebviewState::new();
    let events = vec![
        start("a"),
        start("b"),
        chunk("a", "# Ti"),
        chunk("b", "- one\n"),
        chunk("a", "tle\n\nbody **str"),
        chunk("b", "- two"),
        end("b"),
        chunk("a", "ong**"),
        end("a"),
    ];
    for event in events {
        state.apply_agent_event(event);
    }

    assert_eq!(
        state.stream_html("a"),
        Some(render_markdown("# Title\n\nbody **strong**").as_str())
    );
    assert_eq!(
        state.stream_html("b"),
        Some(render_markdown("- one\n- two").as_str())
    );
    assert!(state.open_stream_ids().is_empty());
}

#[test]
fn test_chunk_after_end_opens_a_fresh_block() {
    let mut state = WebviewState::new();
    state.apply_agent_event(start("s1"));
    state.apply_agent_event(chunk("s1", "# Hi"));
    state.apply_agent_event(end("s1"));
    state.apply_agent_event(chunk("s1", "more"));

    let streams: Vec<_> = state
        .transcript()
        .iter()
        .filter_map(|entry| match entry {
            TranscriptEntry::Stream { html, finished, .. } => Some((html.clone(), *finished)),
            _ => None,
        })
        .collect();
    assert_eq!(
        streams,
        vec![
            ("<h1>Hi</h1>\n".to_string(), true),
            ("<p>more</p>\n".to_string(), false),
        ]
    );
    assert_eq!(state.open_stream_ids(), vec!["s1"]);
}

#[test]
fn test_chunk_without_start_creates_block() {
    let mut state = WebviewState::new();
    state.apply_agent_event(chunk("late", "text"));
    assert_eq!(state.stream_html("late"), Some("<p>text</p>\n"));
    assert_eq!(state.open_stream_ids(), vec!["late"]);

    state.apply_agent_event(end("never-started"));
    assert_eq!(state.transcript().len(), 1);
}

#[test]
fn test_start_without_chunks_leaves_transcript_untouched() {
    let mut state = WebviewState::new();
    state.apply_agent_event(start("quiet"));
    state.apply_agent_event(end("quiet"));
    assert!(state.is_empty());
}

#[test]
fn test_terminal_events_are_idempotent_when_idle() {
    let mut state = WebviewState::new();
    for message in [HostMessage::ChatResponse, HostMessage::TestStopped] {
        state.apply(message);
        assert_eq!(state.run_state(), RunState::Idle);
        assert!(state.is_empty());
    }

    state.apply_agent_event(AgentEvent::Exit { code: Some(0) });
    assert!(state.is_empty());

    state.apply(HostMessage::error("boom"));
    state.apply(HostMessage::ChatResponse);
    assert_eq!(roles(&state), vec![Role::Error]);
    assert_eq!(state.run_state(), RunState::Idle);
}

#[test]
fn test_send_then_response_cycles_running_state() {
    let mut state = WebviewState::new();
    assert_eq!(state.action_label(), ActionLabel::Send);

    let command = state.send_message("  open the login page  ");
    assert_eq!(
        command,
        Some(WebviewCommand::SendMessage {
            message: "open the login page".to_string()
        })
    );
    assert_eq!(state.action_label(), ActionLabel::Stop);

    state.apply(HostMessage::ChatResponse);
    assert_eq!(state.action_label(), ActionLabel::Send);
    assert!(state.take_focus_request());
    assert!(!state.take_focus_request());
}

#[test]
fn test_sequential_sends_are_not_gated_by_running() {
    let mut state = WebviewState::new();
    assert!(state.send_message("first").is_some());
    assert!(state.send_message("second").is_some());

    let contents: Vec<_> = state.messages().map(|m| m.content.clone()).collect();
    assert_eq!(contents, vec!["first", "second"]);
    assert!(state.is_running());
    assert_eq!(state.action_label(), ActionLabel::Stop);
}

#[test]
fn test_empty_send_is_ignored() {
    let mut state = WebviewState::new();
    assert_eq!(state.send_message("   "), None);
    assert!(state.is_empty());
    assert!(!state.is_running());
}

#[test]
fn test_stop_resets_locally_and_requests_cancel() {
    let mut state = WebviewState::new();
    assert_eq!(state.stop_test(), None);

    let _ = state.run_tests();
    assert!(state.is_running());
    assert_eq!(state.primary_action(""), Some(WebviewCommand::StopTest));
    assert!(!state.is_running());
    assert_eq!(roles(&state), vec![Role::Status, Role::Status]);

    state.apply(HostMessage::TestStopped);
    assert_eq!(roles(&state).len(), 2);
}

#[test]
fn test_run_status_names_selected_file() {
    let mut state = WebviewState::new();
    state.apply(HostMessage::TestFileInfo {
        file_name: "login.yaml".to_string(),
    });
    assert_eq!(state.run_tests(), WebviewCommand::RunTests);
    let last = state.messages().last().expect("status message");
    assert_eq!(last.content, "Running login.yaml...");
}

#[test]
fn test_error_message_carries_payload() {
    let mut state = WebviewState::new();
    let _ = state.send_message("go");
    state.apply(HostMessage::Error {
        data: json!({ "message": "agent offline" }),
    });

    let last = state.messages().last().expect("error message");
    assert_eq!(last.role, Role::Error);
    assert_eq!(last.content, "agent offline");
    assert!(!state.is_running());
}

#[test]
fn test_non_streaming_content_and_debug_suppression() {
    let mut state = WebviewState::new();
    state.apply(HostMessage::AgentEvent {
        event_name: "log:markdown:static".to_string(),
        data: json!("**done**"),
    });
    state.apply(HostMessage::AgentEvent {
        event_name: "log:debug".to_string(),
        data: json!("internal"),
    });
    state.apply(HostMessage::AgentEvent {
        event_name: "log:info".to_string(),
        data: json!("connected"),
    });
    state.apply(HostMessage::AgentEvent {
        event_name: "error:sdk".to_string(),
        data: json!("quota"),
    });
    state.apply(HostMessage::AgentEvent {
        event_name: "log:markdown:static".to_string(),
        data: json!("```\nsteps: []\n```"),
    });

    assert_eq!(
        roles(&state),
        vec![Role::Assistant, Role::Status, Role::Error, Role::Code]
    );
    let first = state.messages().next().expect("first");
    assert_eq!(first.html, "<p><strong>done</strong></p>\n");
}

#[test]
fn test_unknown_events_are_ignored() {
    let mut state = WebviewState::new();
    let _ = state.send_message("hi");
    state.apply(HostMessage::AgentEvent {
        event_name: "vm:booted".to_string(),
        data: json!({ "id": 7 }),
    });
    assert_eq!(state.transcript().len(), 1);
    assert!(state.is_running());
}

#[test]
fn test_spinner_completes_on_next_log_event() {
    let mut state = WebviewState::new();
    state.apply_agent_event(AgentEvent::Narration {
        text: "Looking at the screen".to_string(),
    });
    state.apply_agent_event(AgentEvent::Narration {
        text: "Clicking login".to_string(),
    });

    let spinners = |state: &WebviewState| -> Vec<SpinnerState> {
        state
            .transcript()
            .iter()
            .filter_map(|entry| match entry {
                TranscriptEntry::Loading { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    };
    assert_eq!(
        spinners(&state),
        vec![SpinnerState::Done, SpinnerState::Active]
    );

    state.apply_agent_event(AgentEvent::Log {
        level: LogLevel::Log,
        message: "clicked".to_string(),
    });
    assert_eq!(spinners(&state), vec![SpinnerState::Done, SpinnerState::Done]);

    state.apply_agent_event(AgentEvent::Narration {
        text: "Waiting for the page".to_string(),
    });
    state.apply_agent_event(AgentEvent::from_wire("log:trace", json!("tick")));
    assert_eq!(
        spinners(&state),
        vec![SpinnerState::Done, SpinnerState::Done, SpinnerState::Done]
    );
    assert!(!state
        .transcript()
        .iter()
        .any(|entry| matches!(entry, TranscriptEntry::Message(m) if m.content.contains("tick"))));
}

#[test]
fn test_presentation_messages_update_controls() {
    let mut state = WebviewState::new();
    state.apply(HostMessage::ShowExamples {
        examples: vec!["open google.com".to_string()],
    });
    state.apply(HostMessage::UpdateFileIndicator {
        workspace_name: "demo".to_string(),
        file_name: "login.yaml".to_string(),
    });
    state.apply(HostMessage::ShowRunButton);
    assert!(state.controls().run_button_visible);
    assert_eq!(state.examples(), ["open google.com".to_string()]);
    assert_eq!(
        state.file_indicator().map(|f| f.file_name.as_str()),
        Some("login.yaml")
    );

    state.apply(HostMessage::HideInputAndRunButton);
    assert!(!state.controls().input_visible);
    assert!(!state.controls().run_button_visible);
    state.apply(HostMessage::ShowInputAndRunButton);
    assert!(state.controls().input_visible);
}

#[test]
fn test_clear_chat_drops_open_streams() {
    let mut state = WebviewState::new();
    state.apply_agent_event(chunk("s1", "partial"));
    state.apply(HostMessage::ClearChat);
    assert!(state.is_empty());
    assert!(state.open_stream_ids().is_empty());

    state.apply_agent_event(chunk("s1", "fresh"));
    assert_eq!(state.stream_html("s1"), Some("<p>fresh</p>\n"));
}
