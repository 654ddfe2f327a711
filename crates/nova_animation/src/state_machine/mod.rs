//! Animation State Machines
//!
//! Two flavours share the parameter and condition types:
//!
//! - [`DataDrivenStateMachine`]: states, transitions, events and behaviors
//!   come from JSON authoring data. Transition conditions are expression
//!   strings (see [`ConditionExpressionParser`]) and/or structured
//!   [`TransitionCondition`]s.
//! - [`AnimationStateMachine`]: assembled in code with closure conditions.
//!
//! Both can drive an [`crate::controller::AnimationController`], issuing a
//! `play` on start and a `cross_fade` per transition.

mod code_built;
mod condition;
mod config;
mod data_driven;
mod expression;
mod parameters;

pub use code_built::{AnimationStateMachine, TransitionPredicate};
pub use condition::{ConditionMode, EQUALITY_EPSILON, TransitionCondition};
pub use config::{
    AnimationEvent, AnimationState, StateBehavior, StateMachineConfig, StateMachineLayer, StateTransition,
};
pub use data_driven::{DataDrivenStateMachine, MAX_HISTORY, StateCallback, StateHistoryEntry};
pub use expression::{ConditionExpressionParser, Expr, Op};
pub use parameters::{AnimationParameter, ParameterKind, ParameterSet, ParameterValue};
