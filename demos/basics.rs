use salient::StringMap;

fn main() {
    // A map with the default configuration: 16 buckets, load factor 0.75.
    let map = StringMap::new();

    map.put("TAB1".to_string(), "A".to_string());
    map.put("TAB2".to_string(), "A".to_string());

    println!("map:       {map}");
    println!("size:      {}", map.size());
    println!("values:    {}", map.values());
    println!("key set:   {}", map.key_set());
    println!("entry set: {}", map.entry_set());

    // put() returns the value the key held before.
    let previous = map.put("TAB1".to_string(), "B".to_string());
    assert_eq!(previous.as_deref(), Some("A"));
    println!("after updating TAB1: {map}");
}
