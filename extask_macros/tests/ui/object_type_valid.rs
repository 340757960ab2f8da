use extask::prelude::*;

#[derive(ObjectType, Serialize, Deserialize, Debug)]
struct Invoice {
    number: String,
}

#[derive(ObjectType, Serialize, Deserialize, Debug)]
#[object_type(name = "com.acme.Order")]
struct Order {
    lines: Vec<String>,
}

#[derive(ObjectType, Serialize, Deserialize, Debug)]
struct Page<T> {
    items: Vec<T>,
}

fn main() {
    assert_eq!(Invoice::object_type_name(), "Invoice");
    assert_eq!(Order::object_type_name(), "com.acme.Order");
    assert_eq!(Page::<u8>::object_type_name(), "Page");
}
