use std::collections::HashSet;

use winit::event::{
    ElementState, KeyboardInput, MouseButton, MouseScrollDelta, VirtualKeyCode, WindowEvent,
};

/// Pixel scroll (touchpads) is converted to wheel lines with this factor.
const PIXELS_PER_LINE: f32 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    ToggleUi,
    RegenerateScene,
    SaveSnapshot,
}

impl KeyAction {
    pub fn from_key(key: VirtualKeyCode) -> Option<Self> {
        match key {
            VirtualKeyCode::Escape => Some(KeyAction::Quit),
            VirtualKeyCode::F1 => Some(KeyAction::ToggleUi),
            VirtualKeyCode::F2 => Some(KeyAction::RegenerateScene),
            VirtualKeyCode::F12 => Some(KeyAction::SaveSnapshot),
            _ => None,
        }
    }
}

/// Everything the user did during one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    pub close_requested: bool,
    /// Keys that went down this frame, in order.
    pub pressed: Vec<VirtualKeyCode>,
    /// Keys down at the end of the frame.
    pub held: HashSet<VirtualKeyCode>,
    pub shift: bool,
    /// Wheel lines, positive away from the user.
    pub scroll_delta: f32,
    /// Cursor travel while the primary button was down, in pixels.
    pub drag_delta: glam::Vec2,
}

impl FrameInput {
    pub fn actions(&self) -> impl Iterator<Item = KeyAction> + '_ {
        self.pressed.iter().copied().filter_map(KeyAction::from_key)
    }

    pub fn is_held(&self, key: VirtualKeyCode) -> bool {
        self.held.contains(&key)
    }
}

/// Folds window events into a [`FrameInput`] per frame.
#[derive(Debug, Default)]
pub struct InputState {
    frame: FrameInput,
    cursor: Option<glam::Vec2>,
    primary_down: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.frame.close_requested = true,
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        state,
                        virtual_keycode: Some(keycode),
                        ..
                    },
                ..
            } => match state {
                ElementState::Pressed => {
                    // Key repeat delivers Pressed again, only the first counts.
                    if self.frame.held.insert(*keycode) {
                        self.frame.pressed.push(*keycode);
                    }
                }
                ElementState::Released => {
                    self.frame.held.remove(keycode);
                }
            },
            WindowEvent::ModifiersChanged(modifiers) => self.frame.shift = modifiers.shift(),
            WindowEvent::MouseWheel { delta, .. } => {
                self.frame.scroll_delta += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_LINE,
                };
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => self.primary_down = *state == ElementState::Pressed,
            WindowEvent::CursorMoved { position, .. } => {
                let position = glam::Vec2::new(position.x as f32, position.y as f32);
                if let (true, Some(previous)) = (self.primary_down, self.cursor) {
                    self.frame.drag_delta += position - previous;
                }
                self.cursor = Some(position);
            }
            WindowEvent::CursorLeft { .. } => self.cursor = None,
            WindowEvent::Focused(false) => {
                self.primary_down = false;
                self.frame.held.clear();
            }
            _ => {}
        }
    }

    /// Hand out this frame's input and start collecting the next one. Held
    /// keys and modifiers carry over.
    pub fn take_frame(&mut self) -> FrameInput {
        let next = FrameInput {
            held: self.frame.held.clone(),
            shift: self.frame.shift,
            ..Default::default()
        };
        std::mem::replace(&mut self.frame, next)
    }
}
