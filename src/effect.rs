use crate::markup::Target;
use crate::payment::CardDetails;
use serde::Serialize;

/// Presentation changes applied to the server-rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DomEffect {
    SetText { target: Target, text: String },
    SetTitle { target: Target, title: String },
    Show { target: Target },
    Hide { target: Target },
    AddClass { target: Target, class: String },
    RemoveClass { target: Target, class: String },
    SetChecked { target: Target, checked: bool },
    SetDisabled { target: Target, disabled: bool },
    /// Focus the field and select its contents.
    Select { target: Target },
    AppendHiddenInput { form: Target, id: String, name: String, value: String },
    /// The submit handler returns false: the browser must not submit.
    PreventSubmit,
    /// Native form submission, bypassing the submit handlers.
    SubmitForm { form: Target },
    AttachDatetimePicker { target: Target, options: PickerOptions },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickerOptions {
    pub widget_parent: String,
    pub format: String,
    pub icons: Vec<(String, String)>,
}

/// Work that leaves the dispatcher: network calls and tokenizer setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LookupCoupon {
        seq: u64,
        code: String,
        csrf_token: String,
    },
    RequestToken {
        card: CardDetails,
    },
    SetPublishableKey {
        key: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Dom(DomEffect),
    Command(Command),
}

pub fn show(target: Target) -> DomEffect {
    DomEffect::Show { target }
}

pub fn hide(target: Target) -> DomEffect {
    DomEffect::Hide { target }
}

pub fn set_text(target: Target, text: impl Into<String>) -> DomEffect {
    DomEffect::SetText {
        target,
        text: text.into(),
    }
}

pub fn add_class(target: Target, class: &str) -> DomEffect {
    DomEffect::AddClass {
        target,
        class: class.to_string(),
    }
}

pub fn remove_class(target: Target, class: &str) -> DomEffect {
    DomEffect::RemoveClass {
        target,
        class: class.to_string(),
    }
}

/// Lift a list of DOM effects into page effects.
pub fn dom(effects: Vec<DomEffect>) -> Vec<Effect> {
    effects.into_iter().map(Effect::Dom).collect()
}
