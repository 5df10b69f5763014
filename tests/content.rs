mod common;

use common::{content_root, harness_with_registry, settle, transcript, Harness};
use missiond::missions::{validate_template, ActionRegistry, TemplateId, TemplateRegistry};
use missiond::services::{Credentials, ScannedServer};

fn bundled() -> TemplateRegistry {
    TemplateRegistry::load(content_root()).expect("bundled missions load")
}

#[test]
fn bundled_missions_load_and_validate() {
    let registry = bundled();
    let ids: Vec<String> = registry
        .get_mission_templates()
        .iter()
        .map(|t| t.id.to_string())
        .collect();
    assert_eq!(
        ids,
        vec![
            "1stcontact-ghostfox",
            "2ndcontact-ghostfox",
            "final-ghostfox",
            "guess-family-password",
            "wifi_reset_mission",
            "wifi_reset_uncle_mission",
        ]
    );

    let actions = ActionRegistry::with_builtin_handlers();
    for template in registry.get_mission_templates() {
        let issues = validate_template(&template, &actions);
        assert!(issues.is_empty(), "{}: {:?}", template.id, issues);
    }
}

fn eligible(h: &Harness) -> Vec<String> {
    h.manager
        .eligible_templates()
        .iter()
        .map(|t| t.id.to_string())
        .collect()
}

fn last_line(h: &Harness, contact: &str) -> Option<String> {
    transcript(&h.env, contact).last().cloned()
}

fn creds_lines(h: &Harness, contact: &str) -> usize {
    transcript(&h.env, contact)
        .iter()
        .filter(|line| line.starts_with("here's the server creds..."))
        .count()
}

#[tokio::test(start_paused = true)]
async fn wifi_reset_plays_through_and_unlocks_act_one() {
    let h = harness_with_registry(bundled());
    let wifi = TemplateId::new("wifi_reset_mission");
    let uncle = TemplateId::new("wifi_reset_uncle_mission");
    assert_eq!(eligible(&h), vec!["wifi_reset_mission"]);

    h.manager.start_mission(&wifi, false).unwrap();
    settle(2_500).await;
    let mom = "players.mom";
    assert_eq!(transcript(&h.env, mom).len(), 2);

    // asking for help gets hints and leaves the hint armed
    h.env.chat.add_message_to(mom, "Where is the router?");
    settle(4_000).await;
    assert!(transcript(&h.env, mom).contains(&"Your documents maybe?".to_string()));

    // claiming success too early is rejected
    h.env.chat.add_message_to(mom, "I fixed it");
    settle(4_000).await;
    assert!(transcript(&h.env, mom).contains(&"No it isn't. Try again honey.".to_string()));
    assert_eq!(h.manager.active_count(), 1);

    let syslog = h
        .env
        .hosts
        .resolve("homerouter.local")
        .and_then(|host| host.syslog())
        .expect("router syslog");
    syslog.log_event("reboot", "power cycled by the player");
    settle(2_500).await;
    assert_eq!(
        transcript(&h.env, mom).last().map(String::as_str),
        Some("Is it working? Google is doing something")
    );

    h.env.chat.add_message_to(mom, "yes, try now");
    settle(2_000).await;
    assert_eq!(
        transcript(&h.env, mom).last().map(String::as_str),
        Some("You're amazing! The WiFi's back. Thank you!")
    );

    assert_eq!(h.manager.active_count(), 0);
    assert_eq!(h.manager.count_succeeded(&wifi), 1);
    assert!(h.manager.is_unlocked("ACT1"));
    assert!(h.manager.is_unlocked("ACT1+"));
    assert!(!h.manager.is_mission_unlocked(&h.manager.template(&wifi).unwrap()));
    assert!(h.manager.is_mission_unlocked(&h.manager.template(&uncle).unwrap()));
    assert_eq!(eligible(&h), vec!["wifi_reset_uncle_mission"]);
}

#[tokio::test(start_paused = true)]
async fn family_password_is_the_pet_name_until_changed() {
    let h = harness_with_registry(bundled());
    h.manager.unlock(&["ACT1", "ACT1+", "uncle2"]);
    let family = TemplateId::new("guess-family-password");
    assert!(eligible(&h).contains(&family.to_string()));

    let id = h.manager.start_mission(&family, false).unwrap();
    settle(8_000).await;
    let uncle = "players.uncle";
    assert_eq!(
        transcript(&h.env, uncle).last().map(String::as_str),
        Some("'unclecoolest'")
    );

    let status = h.manager.active_mission(&id).unwrap();
    let petname = status.variables["petname"].clone();
    let router = status.variables["router_hostname"].clone();
    assert_eq!(status.variables["petname_length"], petname.len().to_string());
    assert_eq!(status.variables["petnamehint"], format!("It starts with {}", &petname[..1]));

    let login = h.env.hosts.resolve(&router).and_then(|host| host.login()).unwrap();
    assert!(login.attempt_login("admin", &petname));

    h.env.chat.add_message_to(uncle, "I changed it");
    settle(1_000).await;
    assert_eq!(
        transcript(&h.env, uncle).last().map(String::as_str),
        Some("Nope, that didn't work. That kid!!!")
    );

    assert!(login.replace_password("admin", "unclecoolest"));
    h.env.chat.add_message_to(uncle, "done, new password set");
    settle(1_000).await;

    assert_eq!(h.manager.count_succeeded(&family), 1);
    assert!(h.manager.is_unlocked("ACT2+"));
    assert_eq!(h.env.wallet.balance(), 1);
    assert_eq!(h.env.reputation.reputation(), 10);
}

#[tokio::test(start_paused = true)]
async fn campaign_runs_from_uncle_router_to_game_won() {
    let h = harness_with_registry(bundled());
    h.manager.unlock(&["ACT1", "ACT1+"]);
    let uncle = "players.uncle";
    let fox = "hacker.ghostfox";

    // uncle's router: factory reset, player sets the password he asks for
    assert_eq!(eligible(&h), vec!["wifi_reset_uncle_mission"]);
    let id = h.manager.start_mission(&TemplateId::new("wifi_reset_uncle_mission"), false).unwrap();
    settle(9_000).await;
    assert_eq!(last_line(&h, uncle).as_deref(), Some("Tell me when its done"));
    let router = h.manager.active_mission(&id).unwrap().variables["router_hostname"].clone();
    let login = h.env.hosts.resolve(&router).and_then(|host| host.login()).unwrap();
    assert!(login.attempt_login("admin", "factory-1234"));

    h.env.chat.add_message_to(uncle, "done");
    settle(1_000).await;
    assert_eq!(last_line(&h, uncle).as_deref(), Some("Nope, that didn't work. Try again!"));
    assert!(login.replace_password("admin", "unclecool"));
    h.env.chat.add_message_to(uncle, "done now");
    settle(1_000).await;
    assert_eq!(
        last_line(&h, uncle).as_deref(),
        Some("You did it! The WiFi is back. Thanks, kiddo!")
    );
    assert!(h.env.apps.is_installed("ByteWallet"));
    assert_eq!(h.env.wallet.balance(), 1);
    assert_eq!(h.env.reputation.reputation(), 10);
    assert!(h.manager.is_unlocked("firstcontact"));

    // first contact: an instant event carries the whole intro
    assert_eq!(eligible(&h), vec!["1stcontact-ghostfox"]);
    h.manager.start_mission(&TemplateId::new("1stcontact-ghostfox"), false).unwrap();
    settle(11_000).await;
    assert_eq!(
        last_line(&h, fox).as_deref(),
        Some("Keep helping your family, if you don't get caught I'll have more for you...")
    );
    assert_eq!(h.manager.active_count(), 0);
    assert!(h.env.apps.is_installed("Rep"));
    assert!(h.env.apps.is_installed("HackerMon"));
    assert_eq!(h.env.reputation.reputation(), 20);

    // the family password mission reuses uncle's router
    assert_eq!(eligible(&h), vec!["guess-family-password"]);
    let id = h.manager.start_mission(&TemplateId::new("guess-family-password"), false).unwrap();
    let status = h.manager.active_mission(&id).unwrap();
    assert_eq!(status.variables["router_hostname"], router);
    assert!(login.attempt_login("admin", &status.variables["petname"]));
    settle(8_000).await;
    assert!(login.replace_password("admin", "unclecoolest"));
    h.env.chat.add_message_to(uncle, "done, new password set");
    settle(1_000).await;
    assert!(h.manager.is_unlocked("ACT2+"));
    assert_eq!(h.env.reputation.reputation(), 30);

    // second contact hands out scanned credentials
    assert_eq!(eligible(&h), vec!["2ndcontact-ghostfox"]);
    let scanned: Vec<ScannedServer> = (0..5)
        .map(|i| ScannedServer::new(format!("box{}.net", i), vec![Credentials::new("guest", format!("guest{}", i))]))
        .collect();
    h.env.scanner.publish_servers(scanned);
    h.manager.start_mission(&TemplateId::new("2ndcontact-ghostfox"), false).unwrap();
    settle(17_000).await;
    assert_eq!(h.manager.active_count(), 0);
    assert_eq!(creds_lines(&h, fox), 3);
    assert!(h.env.apps.is_installed("Secrets"));
    assert!(h.env.apps.is_installed("Scan"));
    assert_eq!(h.env.reputation.reputation(), 40);

    // the finale waits for reputation, and credentials are never shared twice
    assert!(eligible(&h).is_empty());
    h.env.reputation.alter_reputation(15);
    assert_eq!(eligible(&h), vec!["final-ghostfox"]);
    let finale = TemplateId::new("final-ghostfox");
    h.manager.start_mission(&finale, false).unwrap();
    settle(5_000).await;
    assert!(transcript(&h.env, fox).contains(&"(GAME WON)".to_string()));
    assert_eq!(creds_lines(&h, fox), 3);
    assert_eq!(h.manager.count_succeeded(&finale), 1);
    assert!(eligible(&h).is_empty());
}
