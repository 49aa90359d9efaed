use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// `name=action@nth` pairs separated by commas, e.g. `spawn=fail@3`
pub(crate) const ENV_FAILPOINT: &str = "COKE_FAILPOINT";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FailAction {
    Panic,
    Fail,
}

#[derive(Clone, Copy)]
struct Rule {
    action: FailAction,
    nth: Option<u64>,
    hits: u64,
}

struct State {
    raw: String,
    rules: HashMap<String, Rule>,
}

impl State {
    fn new() -> Self {
        Self {
            raw: String::new(),
            rules: HashMap::new(),
        }
    }

    fn refresh(&mut self) {
        let current = std::env::var(ENV_FAILPOINT).unwrap_or_default();
        if current == self.raw {
            return;
        }
        self.rules = parse_rules(&current);
        self.raw = current;
    }

    fn hit(&mut self, name: &str) -> Option<FailAction> {
        self.refresh();
        let rule = self.rules.get_mut(name)?;
        rule.hits += 1;
        match rule.nth {
            Some(nth) if rule.hits != nth => None,
            _ => Some(rule.action),
        }
    }
}

fn parse_rules(raw: &str) -> HashMap<String, Rule> {
    let mut out = HashMap::new();

    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        let (name, body) = token.split_once('=').unwrap_or((token, "fail"));
        if name.is_empty() {
            continue;
        }

        let (action_raw, nth_raw) = body.split_once('@').unwrap_or((body, ""));
        let action = match action_raw {
            "fail" => FailAction::Fail,
            "panic" => FailAction::Panic,
            _ => continue,
        };

        let nth = if nth_raw.is_empty() {
            None
        } else {
            nth_raw.parse::<u64>().ok().filter(|x| *x > 0)
        };

        out.insert(
            name.to_string(),
            Rule {
                action,
                nth,
                hits: 0,
            },
        );
    }

    out
}

fn global_state() -> &'static Mutex<State> {
    static STATE: OnceLock<Mutex<State>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(State::new()))
}

/// an armed `fail` rule turns into an io error, as if the OS had refused the call
pub(crate) fn check(name: &str) -> std::io::Result<()> {
    let mut lk = global_state().lock().unwrap_or_else(|e| e.into_inner());
    match lk.hit(name) {
        None => Ok(()),
        Some(FailAction::Panic) => panic!("failpoint panic: {name}"),
        Some(FailAction::Fail) => Err(std::io::Error::other(format!("failpoint {name}"))),
    }
}
