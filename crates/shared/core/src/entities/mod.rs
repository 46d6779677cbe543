mod alert;
mod change;
mod notification;
mod priority;

pub use alert::Alert;
pub use change::{ChangeEvent, ChangeOperation};
pub use notification::{NewNotification, Notification, NotificationFilter, NotificationPatch};
pub use priority::{ParsePriorityError, Priority};
