use lac::{Session, UserDefined};

/// Drives a `Session` against a small embedded Lua snippet and prints
/// the editor-intelligence queries a host would run after every
/// keystroke, to exercise the public API end to end without a real
/// editor attached.
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut user_defined = UserDefined::new();
    user_defined.add_variable("playerCount", lac::TypeInfo::number());

    let source = r#"
local player = {}
player.health = 100

function player.heal(amount)
    player.health = player.health + amount
end

local score = 0
score = score + playerCount
"#;

    let mut session = Session::new(user_defined);
    if !session.update_program(source, 0) {
        anyhow::bail!("smoke snippet failed to parse in full");
    }

    let health_pos = source.find("player.health = 100").unwrap() + "player.".len() + 3;
    log::info!(
        "type at `player.health`: {:?}",
        session.get_type_at_pos(source, health_pos)
    );

    let score_pos = source.rfind("score").unwrap() + 2;
    log::info!(
        "type hierarchy at final `score`: {:?}",
        session.get_type_hierarchy_at_pos(source, score_pos)
    );

    let completion_pos = source.find("player.heal").unwrap() + "player.".len();
    let completions = session.get_variable_completion_list(source, completion_pos);
    let mut names: Vec<&str> = completions.keys().map(String::as_str).collect();
    names.sort_unstable();
    log::info!("completions after `player.`: {:?}", names);

    Ok(())
}
