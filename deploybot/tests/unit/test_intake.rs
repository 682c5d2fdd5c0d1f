//! Intake conversation tests

use deploybot::errors::BotError;
use deploybot::intake::controller::{Step, Warning};
use deploybot::intake::session::Stage;
use deploybot::intake::validate::Rejection;

use crate::support::{deploy, harness, BOT_SOURCE, REVOKED_TOKEN, TOKEN, UNREACHABLE_TOKEN};

fn rejection(result: Result<Step, BotError>) -> Rejection {
    match result {
        Err(BotError::Validation(rejection)) => rejection,
        other => panic!("expected a rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_full_conversation() {
    let h = harness().build().await;
    let intake = &h.app.intake;

    assert_eq!(intake.start(1).await.unwrap(), Step::Started { replaced_previous: false });
    assert_eq!(intake.stage(1).await, Some(Stage::AwaitingName));

    let step = intake.handle_text(1, "  demo-bot ").await.unwrap();
    assert_eq!(step, Step::NameAccepted { name: "demo-bot".to_string() });

    let step = intake.handle_text(1, TOKEN).await.unwrap();
    assert!(matches!(step, Step::TokenAccepted { ref bot } if bot.username.as_deref() == Some("demo_helper_bot")));
    assert_eq!(intake.stage(1).await, Some(Stage::AwaitingFiles));

    let step = intake.handle_file(1, "main.py", BOT_SOURCE.as_bytes()).await.unwrap();
    assert_eq!(
        step,
        Step::FileAccepted {
            filename: "main.py".to_string(),
            entry_point: Some("main.py".to_string()),
            files: 1,
            deps: 0,
            warnings: vec![],
        }
    );

    let step = intake.handle_text(1, "/done").await.unwrap();
    let Step::ReadyToConfirm(summary) = step else {
        panic!("expected a summary, got {:?}", step);
    };
    assert_eq!(summary.files, vec!["main.py"]);
    assert_eq!(summary.entry_point.as_deref(), Some("main.py"));

    let step = intake.handle_text(1, "CONFIRM").await.unwrap();
    assert!(matches!(step, Step::Deployed(ref d) if d.name == "demo-bot" && d.owner == 1));
    assert_eq!(intake.stage(1).await, None);
    assert!(h.app.store.name_taken("demo-bot").await);
}

#[tokio::test]
async fn test_bad_names_keep_asking() {
    let h = harness().build().await;
    deploy(&h.app, 9, "taken-bot").await;

    let intake = &h.app.intake;
    intake.start(1).await.unwrap();

    let too_long = "a".repeat(31);
    for bad in ["ab", "Demo-Bot", "1bot", "bot_name", too_long.as_str()] {
        assert_eq!(rejection(intake.handle_text(1, bad).await), Rejection::InvalidName, "{bad}");
    }
    assert_eq!(
        rejection(intake.handle_text(1, "taken-bot").await),
        Rejection::NameTaken("taken-bot".to_string())
    );
    assert_eq!(intake.stage(1).await, Some(Stage::AwaitingName));
}

#[tokio::test]
async fn test_token_checks() {
    let h = harness().build().await;
    let intake = &h.app.intake;
    intake.start(1).await.unwrap();
    intake.handle_text(1, "demo-bot").await.unwrap();

    assert_eq!(
        rejection(intake.handle_text(1, "not-a-token").await),
        Rejection::InvalidTokenFormat
    );
    assert!(matches!(
        rejection(intake.handle_text(1, REVOKED_TOKEN).await),
        Rejection::TokenRejected(_)
    ));
    assert_eq!(intake.stage(1).await, Some(Stage::AwaitingToken));

    intake.handle_text(1, TOKEN).await.unwrap();
    assert_eq!(intake.stage(1).await, Some(Stage::AwaitingFiles));
}

#[tokio::test]
async fn test_unreachable_identity_check_keeps_asking() {
    let h = harness().build().await;
    let intake = &h.app.intake;
    intake.start(1).await.unwrap();
    intake.handle_text(1, "demo-bot").await.unwrap();

    let err = intake.handle_text(1, UNREACHABLE_TOKEN).await.unwrap_err();
    assert!(matches!(err, BotError::ExternalCall(_)));
    assert_eq!(intake.stage(1).await, Some(Stage::AwaitingToken));

    intake.handle_text(1, TOKEN).await.unwrap();
    assert_eq!(intake.stage(1).await, Some(Stage::AwaitingFiles));
}

#[tokio::test]
async fn test_finished_sessions_release_their_slot() {
    let h = harness().build().await;
    let intake = &h.app.intake;

    deploy(&h.app, 1, "demo-bot").await;
    assert_eq!(intake.open_slots(), 0);

    intake.start(2).await.unwrap();
    intake.handle_text(2, "other-bot").await.unwrap();
    assert_eq!(intake.open_slots(), 1);
    assert_eq!(intake.cancel(2).await, Step::Cancelled { had_session: true });
    assert_eq!(intake.open_slots(), 0);

    // owners who never started leave nothing behind
    assert_eq!(intake.handle_text(3, "hello").await.unwrap(), Step::NoSession);
    assert_eq!(intake.handle_file(3, "main.py", BOT_SOURCE.as_bytes()).await.unwrap(), Step::NoSession);
    assert_eq!(intake.stage(3).await, None);
    assert_eq!(intake.cancel(3).await, Step::Cancelled { had_session: false });
    assert_eq!(intake.open_slots(), 0);

    // a new session after release still works
    intake.start(2).await.unwrap();
    assert_eq!(intake.stage(2).await, Some(Stage::AwaitingName));
    assert_eq!(intake.open_slots(), 1);
}

#[tokio::test]
async fn test_file_rules() {
    let h = harness().build().await;
    let intake = &h.app.intake;
    intake.start(1).await.unwrap();
    intake.handle_text(1, "demo-bot").await.unwrap();
    intake.handle_text(1, TOKEN).await.unwrap();

    // /done needs an entry point
    assert_eq!(rejection(intake.handle_text(1, "/done").await), Rejection::MissingEntryPoint);

    // free text is ignored while collecting files
    assert_eq!(
        intake.handle_text(1, "hello").await.unwrap(),
        Step::Ignored(Stage::AwaitingFiles)
    );

    assert!(matches!(
        rejection(intake.handle_file(1, "big.py", &vec![b'x'; 64 * 1024 + 1]).await),
        Rejection::FileTooLarge { size, .. } if size == 64 * 1024 + 1
    ));
    assert!(matches!(
        rejection(intake.handle_file(1, "logo.png", &[0x89, 0x50, 0xff, 0xfe]).await),
        Rejection::NotText(_)
    ));
    assert!(matches!(
        rejection(intake.handle_file(1, "../main.py", b"x").await),
        Rejection::InvalidFilename(_)
    ));

    // helper file that is not bot code, then the manifest without the framework
    let step = intake.handle_file(1, "app.py", b"print('hello')").await.unwrap();
    assert!(matches!(step, Step::FileAccepted { ref warnings, .. } if warnings == &vec![Warning::EntryPointNotABot]));

    let step = intake
        .handle_file(1, "requirements.txt", b"\xEF\xBB\xBFrequests==2.31\nflask\n# comment\n")
        .await
        .unwrap();
    assert!(matches!(
        step,
        Step::FileAccepted { deps: 2, ref warnings, .. } if warnings == &vec![Warning::MissingChatFramework]
    ));
}

#[tokio::test]
async fn test_last_entry_point_wins() {
    let h = harness().build().await;
    let intake = &h.app.intake;
    intake.start(1).await.unwrap();
    intake.handle_text(1, "demo-bot").await.unwrap();
    intake.handle_text(1, TOKEN).await.unwrap();

    intake.handle_file(1, "main.py", BOT_SOURCE.as_bytes()).await.unwrap();
    let step = intake.handle_file(1, "bot.py", BOT_SOURCE.as_bytes()).await.unwrap();
    assert!(matches!(step, Step::FileAccepted { ref entry_point, files: 2, .. } if entry_point.as_deref() == Some("bot.py")));

    let Step::ReadyToConfirm(summary) = intake.handle_text(1, "/done").await.unwrap() else {
        panic!("expected a summary");
    };
    assert_eq!(summary.entry_point.as_deref(), Some("bot.py"));
}

#[tokio::test]
async fn test_file_limit() {
    let h = harness().build().await;
    let intake = &h.app.intake;
    intake.start(1).await.unwrap();
    intake.handle_text(1, "demo-bot").await.unwrap();
    intake.handle_text(1, TOKEN).await.unwrap();

    for name in ["a.py", "b.py", "c.py", "d.py"] {
        intake.handle_file(1, name, b"x = 1").await.unwrap();
    }
    assert_eq!(rejection(intake.handle_file(1, "e.py", b"x = 1").await), Rejection::TooManyFiles(4));

    // replacing an existing file does not count against the limit
    assert!(intake.handle_file(1, "a.py", b"x = 2").await.is_ok());
}

#[tokio::test]
async fn test_confirmation_is_exact() {
    let h = harness().build().await;
    let intake = &h.app.intake;
    intake.start(1).await.unwrap();
    intake.handle_text(1, "demo-bot").await.unwrap();
    intake.handle_text(1, TOKEN).await.unwrap();
    intake.handle_file(1, "main.py", BOT_SOURCE.as_bytes()).await.unwrap();
    intake.handle_text(1, "/done").await.unwrap();

    for almost in ["confirm", "yes", "CONFIRM!"] {
        assert_eq!(
            intake.handle_text(1, almost).await.unwrap(),
            Step::Ignored(Stage::AwaitingConfirmation)
        );
    }
    assert!(!h.app.store.name_taken("demo-bot").await);

    // files can no longer be added
    assert_eq!(
        intake.handle_file(1, "extra.py", b"x = 1").await.unwrap(),
        Step::Ignored(Stage::AwaitingConfirmation)
    );
}

#[tokio::test]
async fn test_name_claimed_before_confirmation() {
    let h = harness().build().await;
    let intake = &h.app.intake;
    intake.start(1).await.unwrap();
    intake.handle_text(1, "demo-bot").await.unwrap();
    intake.handle_text(1, TOKEN).await.unwrap();
    intake.handle_file(1, "main.py", BOT_SOURCE.as_bytes()).await.unwrap();
    intake.handle_text(1, "/done").await.unwrap();

    deploy(&h.app, 2, "demo-bot").await;

    let err = intake.handle_text(1, "CONFIRM").await.unwrap_err();
    assert!(matches!(err, BotError::NameConflict(_)));
    assert_eq!(intake.stage(1).await, None);
}

#[tokio::test]
async fn test_restart_and_cancel_sessions() {
    let h = harness().build().await;
    let intake = &h.app.intake;

    assert_eq!(intake.handle_text(1, "demo-bot").await.unwrap(), Step::NoSession);
    assert_eq!(intake.cancel(1).await, Step::Cancelled { had_session: false });

    intake.start(1).await.unwrap();
    intake.handle_text(1, "demo-bot").await.unwrap();
    assert_eq!(intake.start(1).await.unwrap(), Step::Started { replaced_previous: true });
    assert_eq!(intake.stage(1).await, Some(Stage::AwaitingName));

    assert_eq!(intake.cancel(1).await, Step::Cancelled { had_session: true });
    assert_eq!(intake.stage(1).await, None);
}

#[tokio::test]
async fn test_allow_list() {
    let h = harness().allow(&[1]).build().await;

    assert!(h.app.intake.start(1).await.is_ok());
    assert_eq!(rejection(h.app.intake.start(2).await), Rejection::AccessDenied);
    assert_eq!(h.app.intake.stage(2).await, None);
}
